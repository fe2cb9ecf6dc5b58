use chrono::{DateTime, Utc};

use crate::store::TaskStore;
use crate::tc_error::TcError;
use crate::types::{Task, TaskStatus};
use crate::{log_debug, log_info};

/// What a status write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This caller won the conditional update.
    Changed,
    /// Nothing written. Carries the status the task is known to hold: the
    /// caller's own view when it was already at the target, or the re-read
    /// status when another writer got there first.
    NoOp(TaskStatus),
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, TransitionOutcome::Changed)
    }
}

/// Validate a transition without touching the store.
///
/// Rules:
/// - `target == current` is a no-op (`Ok(false)`), not an error
/// - Forward edges only: `Upcoming -> Actionable`, `Actionable -> Completed`
/// - Anything leaving `Completed` is rejected, as is skipping `Actionable`
pub fn check_transition(task: &Task, target: TaskStatus) -> Result<bool, TcError> {
    use TaskStatus::*;

    if task.status == target {
        return Ok(false);
    }

    match (task.status, target) {
        (Upcoming, Actionable) | (Actionable, Completed) => Ok(true),
        (from, to) => Err(TcError::InvalidTransition {
            task_id: task.id.clone(),
            from,
            to,
        }),
    }
}

/// Apply a validated transition through the store's compare-and-set.
///
/// The write is conditional on the status observed in `task`. When the CAS
/// loses, the instance is re-read: if the task already reached the target (or
/// went past it) the attempt is a `NoOp`; otherwise it is a `StoreConflict`.
pub async fn apply_transition<S: TaskStore>(
    store: &S,
    task: &Task,
    target: TaskStatus,
) -> Result<TransitionOutcome, TcError> {
    if !check_transition(task, target)? {
        return Ok(TransitionOutcome::NoOp(task.status));
    }

    let at = next_timestamp(task.updated_at);
    let won = store
        .compare_and_set_status(&task.workflow_instance_id, &task.id, task.status, target, at)
        .await?;

    if won {
        log_info!(
            "[transition] {}/{}: {} -> {}",
            task.workflow_instance_id,
            task.id,
            task.status,
            target
        );
        return Ok(TransitionOutcome::Changed);
    }

    let tasks = store.load_instance_tasks(&task.workflow_instance_id).await?;
    let observed = tasks
        .iter()
        .find(|t| t.id == task.id)
        .map(|t| t.status)
        .ok_or_else(|| TcError::TaskNotFound {
            instance_id: task.workflow_instance_id.clone(),
            task_id: task.id.clone(),
        })?;

    if observed.rank() >= target.rank() {
        log_debug!(
            "[transition] {}/{}: lost race, already {}",
            task.workflow_instance_id,
            task.id,
            observed
        );
        Ok(TransitionOutcome::NoOp(observed))
    } else {
        Err(TcError::StoreConflict {
            task_id: task.id.clone(),
            expected: task.status,
            found: observed,
        })
    }
}

/// `Upcoming -> Actionable`. A task that is already `Actionable` or
/// `Completed` is left alone, so re-evaluation never downgrades it.
pub async fn advance_to_actionable<S: TaskStore>(
    store: &S,
    task: &Task,
) -> Result<TransitionOutcome, TcError> {
    if task.status != TaskStatus::Upcoming {
        return Ok(TransitionOutcome::NoOp(task.status));
    }
    apply_transition(store, task, TaskStatus::Actionable).await
}

/// `Actionable -> Completed`, on behalf of whoever finished the task's work.
pub async fn mark_completed<S: TaskStore>(
    store: &S,
    task: &Task,
) -> Result<TransitionOutcome, TcError> {
    apply_transition(store, task, TaskStatus::Completed).await
}

/// Timestamps never go backwards for a task, even with clock skew.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}
