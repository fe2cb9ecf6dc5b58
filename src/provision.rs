use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Utc;

use crate::types::{Task, TaskStatus, TaskTemplate, TemplateFile, WorkflowInstance};

/// Load a templates file (`[[templates]]` tables).
pub fn load_templates(path: &Path) -> Result<Vec<TaskTemplate>, String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let file: TemplateFile = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
    Ok(file.templates)
}

/// Check a template set before any instance is built from it.
///
/// Rejects an empty set, blank or duplicate ids, self-dependencies,
/// dependencies on unknown templates, and cycles. The engine itself assumes
/// acyclicity, so this is where a cyclic configuration gets caught.
pub fn validate_templates(templates: &[TaskTemplate]) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    if templates.is_empty() {
        errors.push("no templates defined".to_string());
    }

    let mut seen = HashSet::new();
    for template in templates {
        if template.id.trim().is_empty() {
            errors.push("template with empty id".to_string());
        } else if !seen.insert(template.id.as_str()) {
            errors.push(format!("duplicate template id '{}'", template.id));
        }
    }

    for template in templates {
        for dep in &template.dependencies {
            if dep == &template.id {
                errors.push(format!("template '{}' depends on itself", template.id));
            } else if !seen.contains(dep.as_str()) {
                errors.push(format!(
                    "template '{}' depends on unknown template '{}'",
                    template.id, dep
                ));
            }
        }
    }

    if let Some(cycle) = find_cycle(templates) {
        errors.push(format!("dependency cycle: {}", cycle.join(" -> ")));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over template edges. Returns the first cycle found as
/// a closed path (first id repeated at the end). Self-edges are reported
/// separately by `validate_templates` and skipped here.
pub fn find_cycle(templates: &[TaskTemplate]) -> Option<Vec<String>> {
    let edges: HashMap<&str, Vec<&str>> = templates
        .iter()
        .map(|t| {
            let deps = t
                .dependencies
                .iter()
                .map(String::as_str)
                .filter(|d| *d != t.id)
                .collect();
            (t.id.as_str(), deps)
        })
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut order: Vec<&str> = edges.keys().copied().collect();
    order.sort();

    for start in order {
        if marks.contains_key(start) {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        if let Some(cycle) = visit(start, &edges, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    marks.insert(node, Mark::Visiting);
    path.push(node);

    for &next in edges.get(node).map(Vec::as_slice).unwrap_or(&[]) {
        match marks.get(next) {
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                if !edges.contains_key(next) {
                    continue;
                }
                if let Some(cycle) = visit(next, edges, marks, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
    None
}

/// Build a new instance with one `Upcoming` task per template.
///
/// Tasks are numbered `<prefix>-NNN` in template `order` (ties by template
/// id). Dependencies are copied as template ids and resolved later by the
/// resolver.
pub fn provision_instance(
    instance_id: &str,
    name: &str,
    templates: &[TaskTemplate],
    task_prefix: &str,
) -> Result<WorkflowInstance, String> {
    validate_templates(templates).map_err(|errors| {
        format!(
            "Template validation failed:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    let mut ordered: Vec<&TaskTemplate> = templates.iter().collect();
    ordered.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));

    let now = Utc::now();
    let tasks = ordered
        .iter()
        .enumerate()
        .map(|(index, template)| Task {
            id: format!("{}-{:03}", task_prefix, index + 1),
            template_id: template.id.clone(),
            workflow_instance_id: instance_id.to_string(),
            name: if template.name.is_empty() {
                template.id.clone()
            } else {
                template.name.clone()
            },
            dependencies: template.dependencies.clone(),
            status: TaskStatus::Upcoming,
            auto_executable: template.auto_executable,
            tags: template.tags.clone(),
            updated_at: now,
        })
        .collect();

    Ok(WorkflowInstance {
        id: instance_id.to_string(),
        name: name.to_string(),
        tasks,
    })
}
