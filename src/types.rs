use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Enums ---

/// Lifecycle status of a task.
///
/// Forward-only: `Upcoming -> Actionable -> Completed`. `Completed` is
/// terminal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Upcoming,
    Actionable,
    Completed,
}

impl TaskStatus {
    /// Position in the forward progression, used to detect regressions.
    pub fn rank(&self) -> u8 {
        match self {
            TaskStatus::Upcoming => 0,
            TaskStatus::Actionable => 1,
            TaskStatus::Completed => 2,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Upcoming => write!(f, "upcoming"),
            TaskStatus::Actionable => write!(f, "actionable"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

// --- Structs ---

/// Reusable definition of a workflow step, shared by every instance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct TaskTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Template ids this step waits on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub auto_executable: bool,
    #[serde(default)]
    pub order: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Root of a templates file: a list of `[[templates]]` tables.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct TemplateFile {
    #[serde(default)]
    pub templates: Vec<TaskTemplate>,
}

/// The mutable unit the engine operates on.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Task {
    /// Unique within the owning instance.
    pub id: String,
    pub template_id: String,
    pub workflow_instance_id: String,
    #[serde(default)]
    pub name: String,
    /// Each entry is either a task id or a template id within the same instance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub auto_executable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// One business case and all of its tasks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkflowInstance {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl WorkflowInstance {
    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// On-disk representation of one instance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InstanceFile {
    pub schema_version: u32,
    #[serde(flatten)]
    pub instance: WorkflowInstance,
}

// --- Cascade results ---

/// A non-fatal problem observed while evaluating one task.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskIssue {
    /// A dependency matched several tasks by template id.
    AmbiguousDependency {
        reference: String,
        candidates: Vec<String>,
    },
    /// Dependencies that matched no task in the instance.
    UnresolvedDependencies { references: Vec<String> },
    /// Dependencies that resolved but are not yet met.
    UnmetDependencies { dependencies: Vec<UnmetDependency> },
    /// The status write failed or was rejected.
    TransitionFailed { message: String },
    /// The executor was not reached; the task stays `Actionable`.
    ExecutorTriggerFailed { message: String },
}

impl TaskIssue {
    /// Integrity problems are data errors, as opposed to normal blocking.
    pub fn is_integrity_problem(&self) -> bool {
        matches!(self, TaskIssue::AmbiguousDependency { .. })
    }

    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            TaskIssue::UnresolvedDependencies { .. } | TaskIssue::UnmetDependencies { .. }
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnmetDependency {
    pub reference: String,
    pub task_id: String,
    pub status: TaskStatus,
}

/// Outcome for one task evaluated during a cascade.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskOutcome {
    pub task_id: String,
    pub transitioned: bool,
    pub executor_triggered: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<TaskIssue>,
}

impl TaskOutcome {
    pub fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            transitioned: false,
            executor_triggered: false,
            issues: Vec::new(),
        }
    }
}

/// Summary of one cascade pass.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct CascadeResult {
    pub instance_id: String,
    /// `None` for a reconcile pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_task_id: Option<String>,
    pub outcomes: Vec<TaskOutcome>,
}

impl CascadeResult {
    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id == task_id)
    }

    pub fn transitioned_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.transitioned)
            .map(|o| o.task_id.as_str())
            .collect()
    }

    pub fn triggered_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.executor_triggered)
            .map(|o| o.task_id.as_str())
            .collect()
    }

    pub fn has_integrity_problems(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.issues.iter().any(TaskIssue::is_integrity_problem))
    }
}

/// Request handed to an executor for an auto-executable task.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TriggerRequest {
    pub instance_id: String,
    pub task_id: String,
    pub template_id: String,
    #[serde(default)]
    pub task_name: String,
}

impl TriggerRequest {
    pub fn for_task(task: &Task) -> Self {
        Self {
            instance_id: task.workflow_instance_id.clone(),
            task_id: task.id.clone(),
            template_id: task.template_id.clone(),
            task_name: task.name.clone(),
        }
    }
}
