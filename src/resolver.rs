use crate::types::{Task, WorkflowInstance};

/// Result of resolving one dependency reference against an instance snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Found(&'a Task),
    NotFound,
    /// More than one task shares the referenced template id.
    Ambiguous(Vec<&'a Task>),
}

impl<'a> Resolution<'a> {
    pub fn task(&self) -> Option<&'a Task> {
        match self {
            Resolution::Found(task) => Some(task),
            _ => None,
        }
    }
}

/// Resolve a dependency reference to the task it denotes.
///
/// Order:
/// 1. exact match on task `id`
/// 2. exactly one task whose `template_id` equals the reference
///
/// Only tasks owned by `instance` are considered, so a reference can never
/// land in another workflow instance. An empty reference never resolves.
/// Pure: reads the snapshot only.
pub fn resolve<'a>(instance: &'a WorkflowInstance, reference: &str) -> Resolution<'a> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Resolution::NotFound;
    }

    if let Some(task) = owned_tasks(instance).find(|t| t.id == reference) {
        return Resolution::Found(task);
    }

    let mut by_template: Vec<&Task> = owned_tasks(instance)
        .filter(|t| t.template_id == reference)
        .collect();
    match by_template.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Found(by_template.remove(0)),
        _ => Resolution::Ambiguous(by_template),
    }
}

fn owned_tasks(instance: &WorkflowInstance) -> impl Iterator<Item = &Task> {
    instance
        .tasks
        .iter()
        .filter(move |t| t.workflow_instance_id == instance.id)
}
