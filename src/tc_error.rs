use std::path::PathBuf;

use crate::types::TaskStatus;

/// Engine error taxonomy.
///
/// Categories:
/// - Task-scoped: recorded on one task's outcome, the cascade continues
/// - Fatal: the whole call aborts (instance unreadable, store gone, bad preconditions)
///
/// An unresolved dependency is not an error at all; it is reported as a
/// blocking issue on the task outcome.
#[derive(Debug, thiserror::Error)]
pub enum TcError {
    // Task-scoped
    #[error("Dependency '{reference}' of task {task_id} is ambiguous: matches {}", candidates.join(", "))]
    AmbiguousDependency {
        task_id: String,
        reference: String,
        candidates: Vec<String>,
    },

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Store conflict on task {task_id}: expected {expected}, found {found}")]
    StoreConflict {
        task_id: String,
        expected: TaskStatus,
        found: TaskStatus,
    },

    #[error("Executor trigger failed for task {task_id}: {message}")]
    ExecutorTriggerFailed { task_id: String, message: String },

    // Fatal
    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Task {task_id} not found in instance {instance_id}")]
    TaskNotFound {
        instance_id: String,
        task_id: String,
    },

    #[error("Task {task_id} is {status}, expected completed before cascading")]
    OriginNotCompleted { task_id: String, status: TaskStatus },

    #[error("{0}")]
    InvalidInstanceId(String),

    #[error("Instance {instance_id} already exists")]
    InstanceExists { instance_id: String },

    #[error("Storage corruption in {}: {message}", path.display())]
    StorageCorruption { path: PathBuf, message: String },

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl TcError {
    /// Returns true if the error aborts the whole cascade call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TcError::InstanceNotFound(_)
                | TcError::TaskNotFound { .. }
                | TcError::OriginNotCompleted { .. }
                | TcError::InvalidInstanceId(_)
                | TcError::InstanceExists { .. }
                | TcError::StorageCorruption { .. }
                | TcError::Io(_)
                | TcError::StoreUnavailable(_)
        )
    }

    /// Returns true if the error is isolated to a single task.
    pub fn is_task_scoped(&self) -> bool {
        !self.is_fatal()
    }
}

/// Lets CLI handlers that return `Result<T, String>` use `?` on engine calls.
impl From<TcError> for String {
    fn from(err: TcError) -> String {
        err.to_string()
    }
}
