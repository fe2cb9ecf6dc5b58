use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::store::{self, TaskStore};
use crate::tc_error::TcError;
use crate::types::{Task, TaskStatus, WorkflowInstance};
use crate::{log_debug, log_error};

// --- Command enum ---

pub enum StoreCommand {
    LoadInstanceTasks {
        instance_id: String,
        reply: oneshot::Sender<Result<Vec<Task>, TcError>>,
    },
    GetInstance {
        instance_id: String,
        reply: oneshot::Sender<Result<WorkflowInstance, TcError>>,
    },
    CompareAndSetStatus {
        instance_id: String,
        task_id: String,
        expected: TaskStatus,
        new_status: TaskStatus,
        at: DateTime<Utc>,
        reply: oneshot::Sender<Result<bool, TcError>>,
    },
    InsertInstance {
        instance: Box<WorkflowInstance>,
        reply: oneshot::Sender<Result<(), TcError>>,
    },
    ListInstances {
        reply: oneshot::Sender<Result<Vec<String>, TcError>>,
    },
}

// --- StoreHandle ---

/// Cloneable handle to the store actor. Every write is serialized by the
/// actor, which is what makes compare-and-set atomic per task.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    async fn send_command<T>(
        &self,
        command: StoreCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, TcError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| TcError::StoreUnavailable("store actor shut down".to_string()))?;
        rx.await
            .map_err(|_| TcError::StoreUnavailable("store actor dropped reply".to_string()))
    }

    pub async fn get_instance(&self, instance_id: &str) -> Result<WorkflowInstance, TcError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            StoreCommand::GetInstance {
                instance_id: instance_id.to_string(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn insert_instance(&self, instance: WorkflowInstance) -> Result<(), TcError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            StoreCommand::InsertInstance {
                instance: Box::new(instance),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn list_instances(&self) -> Result<Vec<String>, TcError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(StoreCommand::ListInstances { reply }, rx)
            .await?
    }
}

impl TaskStore for StoreHandle {
    async fn load_instance_tasks(&self, instance_id: &str) -> Result<Vec<Task>, TcError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            StoreCommand::LoadInstanceTasks {
                instance_id: instance_id.to_string(),
                reply,
            },
            rx,
        )
        .await?
    }

    async fn compare_and_set_status(
        &self,
        instance_id: &str,
        task_id: &str,
        expected: TaskStatus,
        new_status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, TcError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            StoreCommand::CompareAndSetStatus {
                instance_id: instance_id.to_string(),
                task_id: task_id.to_string(),
                expected,
                new_status,
                at,
                reply,
            },
            rx,
        )
        .await?
    }
}

// --- Actor implementation ---

const CHANNEL_CAPACITY: usize = 64;

struct StoreState {
    /// `None` keeps everything in memory.
    store_dir: Option<PathBuf>,
    instances: HashMap<String, WorkflowInstance>,
}

impl StoreState {
    fn instance_mut(&mut self, instance_id: &str) -> Result<&mut WorkflowInstance, TcError> {
        if !self.instances.contains_key(instance_id) {
            let loaded = match &self.store_dir {
                Some(dir) => store::load_instance(dir, instance_id)?,
                None => return Err(TcError::InstanceNotFound(instance_id.to_string())),
            };
            log_debug!(
                "[store] Loaded instance {} ({} tasks)",
                instance_id,
                loaded.tasks.len()
            );
            self.instances.insert(instance_id.to_string(), loaded);
        }
        self.instances
            .get_mut(instance_id)
            .ok_or_else(|| TcError::InstanceNotFound(instance_id.to_string()))
    }

    fn persist(&self, instance_id: &str) -> Result<(), TcError> {
        let (Some(dir), Some(instance)) = (&self.store_dir, self.instances.get(instance_id)) else {
            return Ok(());
        };
        store::save_instance(dir, instance)
    }
}

fn handle_load_instance_tasks(
    state: &mut StoreState,
    instance_id: &str,
) -> Result<Vec<Task>, TcError> {
    Ok(state.instance_mut(instance_id)?.tasks.clone())
}

fn handle_get_instance(
    state: &mut StoreState,
    instance_id: &str,
) -> Result<WorkflowInstance, TcError> {
    Ok(state.instance_mut(instance_id)?.clone())
}

fn handle_compare_and_set(
    state: &mut StoreState,
    instance_id: &str,
    task_id: &str,
    expected: TaskStatus,
    new_status: TaskStatus,
    at: DateTime<Utc>,
) -> Result<bool, TcError> {
    let instance = state.instance_mut(instance_id)?;
    let previous = instance
        .find_task(task_id)
        .map(|t| (t.status, t.updated_at));

    if !store::apply_compare_and_set(instance, task_id, expected, new_status, at)? {
        return Ok(false);
    }

    // Roll back the in-memory write if it cannot be persisted
    if let Err(e) = state.persist(instance_id) {
        log_error!(
            "[store] Failed to persist {}/{}: {}",
            instance_id,
            task_id,
            e
        );
        if let (Ok(instance), Some((status, updated_at))) =
            (state.instance_mut(instance_id), previous)
        {
            if let Some(task) = instance.find_task_mut(task_id) {
                task.status = status;
                task.updated_at = updated_at;
            }
        }
        return Err(e);
    }

    Ok(true)
}

fn handle_insert_instance(
    state: &mut StoreState,
    instance: WorkflowInstance,
) -> Result<(), TcError> {
    store::validate_instance_id(&instance.id).map_err(TcError::InvalidInstanceId)?;

    let exists_on_disk = state
        .store_dir
        .as_ref()
        .map(|dir| store::instance_path(dir, &instance.id).exists())
        .unwrap_or(false);
    if state.instances.contains_key(&instance.id) || exists_on_disk {
        return Err(TcError::InstanceExists {
            instance_id: instance.id,
        });
    }

    let instance_id = instance.id.clone();
    state.instances.insert(instance_id.clone(), instance);
    if let Err(e) = state.persist(&instance_id) {
        state.instances.remove(&instance_id);
        return Err(e);
    }
    Ok(())
}

fn handle_list_instances(state: &StoreState) -> Result<Vec<String>, TcError> {
    let mut ids: Vec<String> = match &state.store_dir {
        Some(dir) => store::list_instance_ids(dir)?,
        None => Vec::new(),
    };
    for id in state.instances.keys() {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids.sort();
    Ok(ids)
}

// --- Actor loop ---

async fn run_store(mut rx: mpsc::Receiver<StoreCommand>, mut state: StoreState) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::LoadInstanceTasks { instance_id, reply } => {
                let result = handle_load_instance_tasks(&mut state, &instance_id);
                let _ = reply.send(result);
            }
            StoreCommand::GetInstance { instance_id, reply } => {
                let result = handle_get_instance(&mut state, &instance_id);
                let _ = reply.send(result);
            }
            StoreCommand::CompareAndSetStatus {
                instance_id,
                task_id,
                expected,
                new_status,
                at,
                reply,
            } => {
                let result = handle_compare_and_set(
                    &mut state,
                    &instance_id,
                    &task_id,
                    expected,
                    new_status,
                    at,
                );
                let _ = reply.send(result);
            }
            StoreCommand::InsertInstance { instance, reply } => {
                let result = handle_insert_instance(&mut state, *instance);
                let _ = reply.send(result);
            }
            StoreCommand::ListInstances { reply } => {
                let result = handle_list_instances(&state);
                let _ = reply.send(result);
            }
        }
    }
}

// --- Spawn ---

/// Spawn a store actor backed by YAML files in `store_dir`.
pub fn spawn_store(store_dir: PathBuf) -> (StoreHandle, tokio::task::JoinHandle<()>) {
    spawn_with_state(StoreState {
        store_dir: Some(store_dir),
        instances: HashMap::new(),
    })
}

/// Spawn a purely in-memory store seeded with `instances`.
pub fn spawn_memory_store(
    instances: Vec<WorkflowInstance>,
) -> (StoreHandle, tokio::task::JoinHandle<()>) {
    spawn_with_state(StoreState {
        store_dir: None,
        instances: instances
            .into_iter()
            .map(|instance| (instance.id.clone(), instance))
            .collect(),
    })
}

fn spawn_with_state(state: StoreState) -> (StoreHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task_handle = tokio::spawn(run_store(rx, state));
    (StoreHandle { sender: tx }, task_handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_store_returns_joinhandle() {
        let (handle, task_handle) = spawn_memory_store(Vec::new());

        // Dropping the only handle closes the channel and stops the actor
        drop(handle);

        let result = task_handle.await;
        assert!(result.is_ok(), "JoinHandle should resolve to Ok(()), got: {:?}", result);
    }

    #[tokio::test]
    async fn unknown_instance_in_memory_store_is_not_found() {
        let (handle, _task) = spawn_memory_store(Vec::new());
        let err = handle.load_instance_tasks("nobody").await.unwrap_err();
        assert!(matches!(err, TcError::InstanceNotFound(ref id) if id == "nobody"));
    }
}
