use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::tc_error::TcError;
use crate::types::{InstanceFile, Task, TaskStatus, WorkflowInstance};

pub const SCHEMA_VERSION: u32 = 1;

/// Read/write access to task records. The engine's only I/O seam besides the
/// executor trigger.
pub trait TaskStore: Send + Sync {
    /// One consistent snapshot of every task in the instance.
    fn load_instance_tasks(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<Vec<Task>, TcError>> + Send;

    /// Set `new_status` only if the task's status is still `expected`.
    ///
    /// Returns `Ok(false)` when another writer changed the status first.
    /// Must be atomic per task record.
    fn compare_and_set_status(
        &self,
        instance_id: &str,
        task_id: &str,
        expected: TaskStatus,
        new_status: TaskStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, TcError>> + Send;
}

/// Compare-and-set on an in-memory instance.
///
/// `updated_at` becomes `max(previous, at)` so it never decreases.
pub fn apply_compare_and_set(
    instance: &mut WorkflowInstance,
    task_id: &str,
    expected: TaskStatus,
    new_status: TaskStatus,
    at: DateTime<Utc>,
) -> Result<bool, TcError> {
    let instance_id = instance.id.clone();
    let task = instance
        .find_task_mut(task_id)
        .ok_or_else(|| TcError::TaskNotFound {
            instance_id,
            task_id: task_id.to_string(),
        })?;

    if task.status != expected {
        return Ok(false);
    }

    task.status = new_status;
    task.updated_at = task.updated_at.max(at);
    Ok(true)
}

/// Instance ids double as file names, so keep them to a safe alphabet.
pub fn validate_instance_id(instance_id: &str) -> Result<(), String> {
    if instance_id.is_empty() {
        return Err("Instance id must not be empty".to_string());
    }
    if !instance_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        || instance_id.starts_with('.')
    {
        return Err(format!(
            "Invalid instance id '{}': use alphanumerics, '-', '_' or '.' (not leading)",
            instance_id
        ));
    }
    Ok(())
}

pub fn instance_path(store_dir: &Path, instance_id: &str) -> PathBuf {
    store_dir.join(format!("{}.yaml", instance_id))
}

/// Load one instance file.
///
/// An id outside the safe alphabet is `InvalidInstanceId` and never touches
/// the filesystem. A missing file is `InstanceNotFound`; unreadable YAML or an
/// unsupported schema version is `StorageCorruption`.
pub fn load_instance(store_dir: &Path, instance_id: &str) -> Result<WorkflowInstance, TcError> {
    validate_instance_id(instance_id).map_err(TcError::InvalidInstanceId)?;
    let path = instance_path(store_dir, instance_id);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TcError::InstanceNotFound(instance_id.to_string()))
        }
        Err(e) => return Err(TcError::Io(format!("Failed to read {}: {}", path.display(), e))),
    };

    let file: InstanceFile =
        serde_yaml_ng::from_str(&contents).map_err(|e| TcError::StorageCorruption {
            path: path.clone(),
            message: e.to_string(),
        })?;

    if file.schema_version != SCHEMA_VERSION {
        return Err(TcError::StorageCorruption {
            path,
            message: format!(
                "unsupported schema_version {} (expected {})",
                file.schema_version, SCHEMA_VERSION
            ),
        });
    }

    if file.instance.id != instance_id {
        return Err(TcError::StorageCorruption {
            path,
            message: format!("file holds instance '{}'", file.instance.id),
        });
    }

    Ok(file.instance)
}

/// Save an instance using write-temp-then-rename, so readers see either the
/// old file or the new one.
pub fn save_instance(store_dir: &Path, instance: &WorkflowInstance) -> Result<(), TcError> {
    fs::create_dir_all(store_dir)
        .map_err(|e| TcError::Io(format!("Failed to create {}: {}", store_dir.display(), e)))?;

    let path = instance_path(store_dir, &instance.id);
    let file = InstanceFile {
        schema_version: SCHEMA_VERSION,
        instance: instance.clone(),
    };
    let yaml = serde_yaml_ng::to_string(&file)
        .map_err(|e| TcError::Io(format!("Failed to serialize instance {}: {}", instance.id, e)))?;

    let temp_file = NamedTempFile::new_in(store_dir).map_err(|e| {
        TcError::Io(format!(
            "Failed to create temp file in {}: {}",
            store_dir.display(),
            e
        ))
    })?;

    fs::write(temp_file.path(), &yaml)
        .map_err(|e| TcError::Io(format!("Failed to write temp file: {}", e)))?;

    let synced = fs::File::open(temp_file.path()).and_then(|f| f.sync_all());
    synced.map_err(|e| TcError::Io(format!("Failed to sync temp file: {}", e)))?;

    temp_file.persist(&path).map_err(|e| {
        TcError::Io(format!(
            "Failed to rename temp file to {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Ids of every instance file in the store directory, sorted.
pub fn list_instance_ids(store_dir: &Path) -> Result<Vec<String>, TcError> {
    let entries = match fs::read_dir(store_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(TcError::Io(format!(
                "Failed to list {}: {}",
                store_dir.display(),
                e
            )))
        }
    };

    let mut ids: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("yaml"))
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
        .collect();
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> WorkflowInstance {
        WorkflowInstance {
            id: "acme".to_string(),
            name: "Acme renewal".to_string(),
            tasks: vec![Task {
                id: "TSK-001".to_string(),
                template_id: "tpl-intake".to_string(),
                workflow_instance_id: "acme".to_string(),
                name: "Intake".to_string(),
                dependencies: Vec::new(),
                status: TaskStatus::Upcoming,
                auto_executable: false,
                tags: Vec::new(),
                updated_at: Utc::now(),
            }],
        }
    }

    #[test]
    fn cas_applies_only_on_expected_status() {
        let mut inst = instance();
        let at = Utc::now();
        assert!(apply_compare_and_set(
            &mut inst,
            "TSK-001",
            TaskStatus::Upcoming,
            TaskStatus::Actionable,
            at
        )
        .unwrap());
        assert!(!apply_compare_and_set(
            &mut inst,
            "TSK-001",
            TaskStatus::Upcoming,
            TaskStatus::Actionable,
            at
        )
        .unwrap());
        assert_eq!(inst.tasks[0].status, TaskStatus::Actionable);
    }

    #[test]
    fn cas_never_moves_timestamp_backwards() {
        let mut inst = instance();
        let before = inst.tasks[0].updated_at;
        let earlier = before - chrono::Duration::minutes(5);
        apply_compare_and_set(
            &mut inst,
            "TSK-001",
            TaskStatus::Upcoming,
            TaskStatus::Actionable,
            earlier,
        )
        .unwrap();
        assert_eq!(inst.tasks[0].updated_at, before);
    }

    #[test]
    fn cas_on_unknown_task_is_not_found() {
        let mut inst = instance();
        let err = apply_compare_and_set(
            &mut inst,
            "TSK-404",
            TaskStatus::Upcoming,
            TaskStatus::Actionable,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, TcError::TaskNotFound { .. }));
    }

    #[test]
    fn instance_id_validation() {
        assert!(validate_instance_id("acme-2026.renewal_1").is_ok());
        assert!(validate_instance_id("").is_err());
        assert!(validate_instance_id("../etc").is_err());
        assert!(validate_instance_id(".hidden").is_err());
        assert!(validate_instance_id("a b").is_err());
    }
}
