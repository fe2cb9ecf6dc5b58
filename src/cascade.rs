use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::satisfaction::{dependency_met, is_satisfied};
use crate::store::TaskStore;
use crate::tc_error::TcError;
use crate::transition::{self, TransitionOutcome};
use crate::trigger::ExecutorTrigger;
use crate::types::{
    CascadeResult, Task, TaskIssue, TaskOutcome, TaskStatus, TriggerRequest, WorkflowInstance,
};
use crate::{log_debug, log_info, log_warn};

/// Knobs for a cascade pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOptions {
    /// A hand-off that takes longer counts as failed (but still triggered).
    pub trigger_timeout: Duration,
    /// Re-sweep when a task evaluated in this pass now counts as met for its
    /// dependents (an auto-executable task became actionable, or another
    /// writer was seen to have advanced it).
    pub propagate_automation: bool,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl CascadeOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            trigger_timeout: Duration::from_secs(config.trigger_timeout_seconds),
            propagate_automation: config.propagate_automation,
        }
    }
}

/// Single entry point for propagating a completion through an instance.
///
/// All status writes go through the transition module's conditional update;
/// nothing here writes status directly.
pub struct CascadeEngine<S, T> {
    store: S,
    trigger: T,
    options: CascadeOptions,
}

impl<S: TaskStore, T: ExecutorTrigger> CascadeEngine<S, T> {
    pub fn new(store: S, trigger: T, options: CascadeOptions) -> Self {
        Self {
            store,
            trigger,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn trigger(&self) -> &T {
        &self.trigger
    }

    /// Re-evaluate every `Upcoming` task after `completed_task_id` completed.
    ///
    /// The caller must already have moved the origin task to `Completed`.
    /// Per-task failures land on that task's outcome; only structural
    /// problems (instance unreadable, origin missing or not completed) fail
    /// the call. Tasks unblocked here are not followed into their own
    /// dependents' completion; that is a later, separate call.
    pub async fn on_task_completed(
        &self,
        instance_id: &str,
        completed_task_id: &str,
    ) -> Result<CascadeResult, TcError> {
        let snapshot = self.load_snapshot(instance_id).await?;

        let origin = snapshot
            .find_task(completed_task_id)
            .ok_or_else(|| TcError::TaskNotFound {
                instance_id: instance_id.to_string(),
                task_id: completed_task_id.to_string(),
            })?;
        if origin.status != TaskStatus::Completed {
            return Err(TcError::OriginNotCompleted {
                task_id: origin.id.clone(),
                status: origin.status,
            });
        }

        log_info!(
            "[cascade] {}: {} completed, evaluating {} upcoming task(s)",
            instance_id,
            completed_task_id,
            snapshot.count_by_status(TaskStatus::Upcoming)
        );

        let outcomes = self.run_pass(snapshot).await;
        let result = CascadeResult {
            instance_id: instance_id.to_string(),
            origin_task_id: Some(completed_task_id.to_string()),
            outcomes,
        };
        log_result(&result);
        Ok(result)
    }

    /// Same pass as `on_task_completed`, without an origin task. Unsticks
    /// instances whose tasks were never re-evaluated (and makes root tasks of
    /// a fresh instance actionable).
    pub async fn reconcile(&self, instance_id: &str) -> Result<CascadeResult, TcError> {
        let snapshot = self.load_snapshot(instance_id).await?;
        log_info!(
            "[cascade] {}: reconciling {} upcoming task(s)",
            instance_id,
            snapshot.count_by_status(TaskStatus::Upcoming)
        );

        let outcomes = self.run_pass(snapshot).await;
        let result = CascadeResult {
            instance_id: instance_id.to_string(),
            origin_task_id: None,
            outcomes,
        };
        log_result(&result);
        Ok(result)
    }

    /// Caller-side helper: record `Actionable -> Completed` for a task whose
    /// work just finished, then cascade from it.
    ///
    /// Completing an already completed task is a no-op write and still
    /// cascades, so a retried call converges.
    pub async fn complete_task(
        &self,
        instance_id: &str,
        task_id: &str,
    ) -> Result<CascadeResult, TcError> {
        let snapshot = self.load_snapshot(instance_id).await?;
        let task = snapshot
            .find_task(task_id)
            .ok_or_else(|| TcError::TaskNotFound {
                instance_id: instance_id.to_string(),
                task_id: task_id.to_string(),
            })?;

        if !transition::mark_completed(&self.store, task).await?.changed() {
            log_debug!("[cascade] {}/{} was already completed", instance_id, task_id);
        }

        self.on_task_completed(instance_id, task_id).await
    }

    async fn load_snapshot(&self, instance_id: &str) -> Result<WorkflowInstance, TcError> {
        let tasks = self.store.load_instance_tasks(instance_id).await?;
        // An instance is provisioned with at least one task
        if tasks.is_empty() {
            return Err(TcError::InstanceNotFound(instance_id.to_string()));
        }
        Ok(WorkflowInstance {
            id: instance_id.to_string(),
            name: String::new(),
            tasks,
        })
    }

    /// Evaluate `Upcoming` tasks in sweeps. Every task in a sweep sees the
    /// same snapshot. Statuses learned during a sweep (own writes, or another
    /// writer's progress seen on a lost race) are folded into the snapshot
    /// afterwards. Another sweep runs only when that made some task count as
    /// met, and there are at most `task_count` sweeps.
    async fn run_pass(&self, mut snapshot: WorkflowInstance) -> Vec<TaskOutcome> {
        let mut outcomes: Vec<TaskOutcome> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut settled: HashSet<String> = HashSet::new();
        let max_sweeps = snapshot.tasks.len().max(1);

        for sweep in 0..max_sweeps {
            let candidates: Vec<Task> = snapshot
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Upcoming && !settled.contains(&t.id))
                .cloned()
                .collect();

            let mut learned: Vec<(String, TaskStatus)> = Vec::new();

            for task in &candidates {
                let (outcome, status) = self.evaluate_task(&snapshot, task).await;
                if status != task.status {
                    learned.push((task.id.clone(), status));
                }
                // Only plain blocking can change within this pass
                let still_blocked = !outcome.issues.is_empty()
                    && outcome.issues.iter().all(TaskIssue::is_blocking);
                if !still_blocked {
                    settled.insert(task.id.clone());
                }

                match index.get(&task.id) {
                    Some(&i) => outcomes[i] = outcome,
                    None => {
                        index.insert(task.id.clone(), outcomes.len());
                        outcomes.push(outcome);
                    }
                }
            }

            let mut newly_met = false;
            for (task_id, status) in &learned {
                if let Some(task) = snapshot.find_task_mut(task_id) {
                    task.status = *status;
                    newly_met |= dependency_met(task);
                }
            }

            if !newly_met || !self.options.propagate_automation {
                break;
            }
            log_debug!(
                "[cascade] {}: sweep {} unblocked further dependencies, re-evaluating",
                snapshot.id,
                sweep + 1
            );
        }

        outcomes
    }

    /// Returns the task's outcome and the status it is now known to hold.
    async fn evaluate_task(
        &self,
        snapshot: &WorkflowInstance,
        task: &Task,
    ) -> (TaskOutcome, TaskStatus) {
        let mut outcome = TaskOutcome::new(&task.id);

        let verdict = is_satisfied(snapshot, task);
        if !verdict.satisfied {
            for (reference, candidates) in &verdict.ambiguous {
                let err = TcError::AmbiguousDependency {
                    task_id: task.id.clone(),
                    reference: reference.clone(),
                    candidates: candidates.clone(),
                };
                log_warn!("[cascade] {}: {}", snapshot.id, err);
            }
            outcome.issues = verdict.issues();
            log_debug!(
                "[cascade] {}/{} stays upcoming ({} issue(s))",
                snapshot.id,
                task.id,
                outcome.issues.len()
            );
            return (outcome, task.status);
        }

        match transition::advance_to_actionable(&self.store, task).await {
            Ok(TransitionOutcome::Changed) => {
                outcome.transitioned = true;
            }
            Ok(TransitionOutcome::NoOp(observed)) => {
                log_debug!(
                    "[cascade] {}/{} already {} (advanced by another writer)",
                    snapshot.id,
                    task.id,
                    observed
                );
                return (outcome, observed);
            }
            Err(e) => {
                log_warn!("[cascade] {}: {}", snapshot.id, e);
                outcome.issues.push(TaskIssue::TransitionFailed {
                    message: e.to_string(),
                });
                return (outcome, task.status);
            }
        }

        // Only the writer that won the transition may hand the task off
        if task.auto_executable {
            match self.fire_trigger(task).await {
                Ok(()) => outcome.executor_triggered = true,
                Err(message) => {
                    let err = TcError::ExecutorTriggerFailed {
                        task_id: task.id.clone(),
                        message: message.clone(),
                    };
                    log_warn!("[cascade] {}: {}", snapshot.id, err);
                    outcome
                        .issues
                        .push(TaskIssue::ExecutorTriggerFailed { message });
                }
            }
        }

        (outcome, TaskStatus::Actionable)
    }

    async fn fire_trigger(&self, task: &Task) -> Result<(), String> {
        let request = TriggerRequest::for_task(task);
        match tokio::time::timeout(
            self.options.trigger_timeout,
            self.trigger.trigger_execution(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(format!(
                "timed out after {}ms",
                self.options.trigger_timeout.as_millis()
            )),
        }
    }
}

fn log_result(result: &CascadeResult) {
    let blocked = result
        .outcomes
        .iter()
        .filter(|o| !o.transitioned && o.issues.iter().any(TaskIssue::is_blocking))
        .count();
    log_info!(
        "[cascade] {}: {} advanced, {} triggered, {} still blocked",
        result.instance_id,
        result.transitioned_ids().len(),
        result.triggered_ids().len(),
        blocked
    );
}
