#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};

use task_cascade::cascade::{CascadeEngine, CascadeOptions};
use task_cascade::store_actor::{spawn_memory_store, StoreHandle};
use task_cascade::trigger::RecordingTrigger;
use task_cascade::types::{Task, TaskStatus, TaskTemplate, WorkflowInstance};

pub const INSTANCE_ID: &str = "acme-renewal";

/// Fixed timestamp used for every fixture task.
pub fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap()
}

/// Creates a manual, `Upcoming` task in `INSTANCE_ID` with no dependencies.
///
/// The template id is derived from the task id (`T1` -> `tpl-t1`) and the
/// name is `"Task {id}"`.
pub fn make_task(id: &str) -> Task {
    Task {
        id: id.to_string(),
        template_id: format!("tpl-{}", id.to_lowercase()),
        workflow_instance_id: INSTANCE_ID.to_string(),
        name: format!("Task {}", id),
        dependencies: Vec::new(),
        status: TaskStatus::Upcoming,
        auto_executable: false,
        tags: Vec::new(),
        updated_at: fixture_time(),
    }
}

/// `make_task` with dependencies and a status.
pub fn make_dep_task(id: &str, deps: &[&str], status: TaskStatus) -> Task {
    let mut task = make_task(id);
    task.dependencies = deps.iter().map(|d| d.to_string()).collect();
    task.status = status;
    task
}

/// Marks a task as auto-executable.
pub fn auto(mut task: Task) -> Task {
    task.auto_executable = true;
    task
}

/// Overrides the template id of a task.
pub fn with_template(mut task: Task, template_id: &str) -> Task {
    task.template_id = template_id.to_string();
    task
}

pub fn make_instance(tasks: Vec<Task>) -> WorkflowInstance {
    WorkflowInstance {
        id: INSTANCE_ID.to_string(),
        name: "Acme renewal".to_string(),
        tasks,
    }
}

pub fn make_template(id: &str, deps: &[&str], order: u32) -> TaskTemplate {
    TaskTemplate {
        id: id.to_string(),
        name: format!("Template {}", id),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        auto_executable: false,
        order,
        tags: Vec::new(),
    }
}

/// Options with a short trigger timeout so timeout tests stay fast.
pub fn fast_options() -> CascadeOptions {
    CascadeOptions {
        trigger_timeout: std::time::Duration::from_millis(200),
        propagate_automation: true,
    }
}

/// Engine over an in-memory store seeded with `instance` and a recording
/// trigger.
pub fn memory_engine(
    instance: WorkflowInstance,
    trigger: RecordingTrigger,
) -> CascadeEngine<StoreHandle, RecordingTrigger> {
    let (store, _task) = spawn_memory_store(vec![instance]);
    CascadeEngine::new(store, trigger, fast_options())
}

/// Current status of every task, in instance order.
pub async fn statuses(engine: &CascadeEngine<StoreHandle, RecordingTrigger>) -> Vec<(String, TaskStatus)> {
    engine
        .store()
        .get_instance(INSTANCE_ID)
        .await
        .expect("load instance")
        .tasks
        .into_iter()
        .map(|t| (t.id, t.status))
        .collect()
}

pub async fn status_of(
    engine: &CascadeEngine<StoreHandle, RecordingTrigger>,
    task_id: &str,
) -> TaskStatus {
    statuses(engine)
        .await
        .into_iter()
        .find(|(id, _)| id == task_id)
        .map(|(_, status)| status)
        .unwrap_or_else(|| panic!("task {} not in instance", task_id))
}

/// Returns the path to the `tests/fixtures` directory.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}
