use crate::resolver::{resolve, Resolution};
use crate::types::{Task, TaskIssue, TaskStatus, UnmetDependency, WorkflowInstance};

/// Verdict for one task's dependency list, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Satisfaction {
    pub satisfied: bool,
    /// References that matched no task.
    pub unresolved: Vec<String>,
    /// References that matched several tasks: `(reference, candidate ids)`.
    pub ambiguous: Vec<(String, Vec<String>)>,
    /// Resolved dependencies that are not yet met.
    pub unmet: Vec<UnmetDependency>,
}

impl Satisfaction {
    /// Diagnostics for a blocked task, as outcome issues.
    pub fn issues(&self) -> Vec<TaskIssue> {
        let mut issues: Vec<TaskIssue> = self
            .ambiguous
            .iter()
            .map(|(reference, candidates)| TaskIssue::AmbiguousDependency {
                reference: reference.clone(),
                candidates: candidates.clone(),
            })
            .collect();
        if !self.unresolved.is_empty() {
            issues.push(TaskIssue::UnresolvedDependencies {
                references: self.unresolved.clone(),
            });
        }
        if !self.unmet.is_empty() {
            issues.push(TaskIssue::UnmetDependencies {
                dependencies: self.unmet.clone(),
            });
        }
        issues
    }
}

/// A resolved dependency is met when it is `Completed`, or when it is an
/// auto-executable task that has reached `Actionable` (handed to its executor).
/// Manual dependencies must be `Completed`.
pub fn dependency_met(dependency: &Task) -> bool {
    match dependency.status {
        TaskStatus::Completed => true,
        TaskStatus::Actionable => dependency.auto_executable,
        TaskStatus::Upcoming => false,
    }
}

/// Decide whether every dependency of `task` is met under `instance`.
///
/// Resolution failures block but are not errors; they are collected for
/// diagnostics. An empty dependency list is trivially satisfied. Order only
/// affects the order of the diagnostics.
pub fn is_satisfied(instance: &WorkflowInstance, task: &Task) -> Satisfaction {
    let mut verdict = Satisfaction::default();

    for reference in &task.dependencies {
        match resolve(instance, reference) {
            Resolution::Found(dependency) => {
                if !dependency_met(dependency) {
                    verdict.unmet.push(UnmetDependency {
                        reference: reference.clone(),
                        task_id: dependency.id.clone(),
                        status: dependency.status,
                    });
                }
            }
            Resolution::NotFound => verdict.unresolved.push(reference.clone()),
            Resolution::Ambiguous(candidates) => verdict.ambiguous.push((
                reference.clone(),
                candidates.iter().map(|t| t.id.clone()).collect(),
            )),
        }
    }

    verdict.satisfied =
        verdict.unresolved.is_empty() && verdict.ambiguous.is_empty() && verdict.unmet.is_empty();
    verdict
}

/// Build a comma-separated summary of what blocks a task.
///
/// Unmet dependencies are formatted as `"ref -> id (status)"`, unresolved ones
/// as `"ref (missing)"`, ambiguous ones as `"ref (ambiguous: a, b)"`.
/// Returns `None` if the task is satisfied.
pub fn blocked_summary(instance: &WorkflowInstance, task: &Task) -> Option<String> {
    let verdict = is_satisfied(instance, task);
    if verdict.satisfied {
        return None;
    }

    let mut parts: Vec<String> = verdict
        .unmet
        .iter()
        .map(|dep| {
            if dep.reference == dep.task_id {
                format!("{} ({})", dep.task_id, dep.status)
            } else {
                format!("{} -> {} ({})", dep.reference, dep.task_id, dep.status)
            }
        })
        .collect();
    parts.extend(
        verdict
            .unresolved
            .iter()
            .map(|reference| format!("{} (missing)", reference)),
    );
    parts.extend(
        verdict
            .ambiguous
            .iter()
            .map(|(reference, candidates)| {
                format!("{} (ambiguous: {})", reference, candidates.join(", "))
            }),
    );
    Some(parts.join(", "))
}
