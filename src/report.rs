use crate::satisfaction::blocked_summary;
use crate::types::{CascadeResult, TaskIssue, TaskStatus, UnmetDependency, WorkflowInstance};

/// Human-readable summary of a cascade: what advanced, what stays blocked and
/// why, and which tasks have integrity problems or warnings.
pub fn format_cascade_summary(result: &CascadeResult) -> Vec<String> {
    let mut lines = Vec::new();

    match &result.origin_task_id {
        Some(origin) => lines.push(format!(
            "Cascade for {} after {} completed",
            result.instance_id, origin
        )),
        None => lines.push(format!("Reconciled {}", result.instance_id)),
    }

    let advanced = result.transitioned_ids();
    if advanced.is_empty() {
        lines.push("  Advanced: none".to_string());
    } else {
        lines.push(format!("  Advanced: {}", advanced.join(", ")));
    }

    let triggered = result.triggered_ids();
    if !triggered.is_empty() {
        lines.push(format!("  Triggered: {}", triggered.join(", ")));
    }

    let blocked: Vec<String> = result
        .outcomes
        .iter()
        .filter(|o| !o.transitioned)
        .filter_map(|o| {
            let reasons: Vec<String> = o
                .issues
                .iter()
                .filter(|i| i.is_blocking())
                .map(describe_issue)
                .collect();
            if reasons.is_empty() {
                None
            } else {
                Some(format!("    {}: {}", o.task_id, reasons.join("; ")))
            }
        })
        .collect();
    if !blocked.is_empty() {
        lines.push(format!("  Blocked ({}):", blocked.len()));
        lines.extend(blocked);
    }

    let problems: Vec<String> = result
        .outcomes
        .iter()
        .flat_map(|o| {
            o.issues
                .iter()
                .filter(|i| !i.is_blocking())
                .map(move |i| format!("    {}: {}", o.task_id, describe_issue(i)))
        })
        .collect();
    if !problems.is_empty() {
        lines.push(format!("  Problems ({}):", problems.len()));
        lines.extend(problems);
    }

    lines
}

pub fn describe_issue(issue: &TaskIssue) -> String {
    match issue {
        TaskIssue::AmbiguousDependency {
            reference,
            candidates,
        } => format!(
            "ambiguous dependency '{}' (matches {})",
            reference,
            candidates.join(", ")
        ),
        TaskIssue::UnresolvedDependencies { references } => {
            format!("unresolved: {}", references.join(", "))
        }
        TaskIssue::UnmetDependencies { dependencies } => format!(
            "waiting on {}",
            dependencies
                .iter()
                .map(describe_unmet)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        TaskIssue::TransitionFailed { message } => format!("transition failed: {}", message),
        TaskIssue::ExecutorTriggerFailed { message } => {
            format!("executor trigger failed (task stays actionable): {}", message)
        }
    }
}

fn describe_unmet(dep: &UnmetDependency) -> String {
    format!("{} ({})", dep.task_id, dep.status)
}

/// One line per task, with blocking reasons for upcoming tasks.
pub fn format_instance_status(instance: &WorkflowInstance) -> Vec<String> {
    let mut lines = vec![format!(
        "{}{}: {} completed, {} actionable, {} upcoming",
        instance.id,
        if instance.name.is_empty() {
            String::new()
        } else {
            format!(" ({})", instance.name)
        },
        instance.count_by_status(TaskStatus::Completed),
        instance.count_by_status(TaskStatus::Actionable),
        instance.count_by_status(TaskStatus::Upcoming),
    )];

    for task in &instance.tasks {
        let mut line = format!(
            "  {:<10} {:<10} {}",
            task.id,
            task.status.to_string(),
            task.name
        );
        if task.auto_executable {
            line.push_str(" [auto]");
        }
        if task.status == TaskStatus::Upcoming {
            if let Some(summary) = blocked_summary(instance, task) {
                line.push_str(&format!(" -- waiting on {}", summary));
            }
        }
        lines.push(line);
    }

    lines
}
