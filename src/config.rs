use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "task-cascade.toml";

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TaskCascadeConfig {
    pub project: ProjectConfig,
    pub engine: EngineConfig,
    pub executor: ExecutorConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Prefix for provisioned task ids (e.g., TSK -> TSK-001).
    pub task_prefix: String,
    pub store_dir: String,
    pub templates_path: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a single executor hand-off.
    pub trigger_timeout_seconds: u64,
    /// Re-evaluate dependents within the same pass once an auto-executable
    /// task becomes actionable.
    pub propagate_automation: bool,
}

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Program spawned per auto-executable task. Unset means log only.
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            task_prefix: "TSK".to_string(),
            store_dir: ".task-cascade/instances".to_string(),
            templates_path: "templates.toml".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trigger_timeout_seconds: 10,
            propagate_automation: true,
        }
    }
}

impl TaskCascadeConfig {
    pub fn store_dir(&self, config_base: &Path) -> PathBuf {
        config_base.join(&self.project.store_dir)
    }

    pub fn templates_path(&self, config_base: &Path) -> PathBuf {
        config_base.join(&self.project.templates_path)
    }
}

pub fn validate(config: &TaskCascadeConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    let prefix = &config.project.task_prefix;
    if prefix.is_empty()
        || !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push(format!(
            "project.task_prefix '{}' must be non-empty and contain only alphanumerics, '-' or '_'",
            prefix
        ));
    }

    if config.project.store_dir.trim().is_empty() {
        errors.push("project.store_dir must not be empty".to_string());
    }

    if config.project.templates_path.trim().is_empty() {
        errors.push("project.templates_path must not be empty".to_string());
    }

    if config.engine.trigger_timeout_seconds < 1 {
        errors.push("engine.trigger_timeout_seconds must be >= 1".to_string());
    }

    if config.executor.command.is_none() && !config.executor.args.is_empty() {
        errors.push("executor.args is set but executor.command is not".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Load `task-cascade.toml` from `project_root`, or defaults if it is absent.
pub fn load_config(project_root: &Path) -> Result<TaskCascadeConfig, String> {
    load_config_from(None, project_root)
}

/// Load from an explicit path when given, otherwise from `project_root`.
pub fn load_config_from(
    config_path: Option<&Path>,
    project_root: &Path,
) -> Result<TaskCascadeConfig, String> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => project_root.join(CONFIG_FILE_NAME),
    };

    if !path.exists() {
        if config_path.is_some() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(TaskCascadeConfig::default());
    }

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    let config: TaskCascadeConfig = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    validate(&config).map_err(|errors| {
        format!(
            "Config validation failed:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    Ok(config)
}

/// Contents written by `task-cascade init`.
pub fn default_config_contents(task_prefix: &str) -> String {
    format!(
        r#"[project]
task_prefix = "{task_prefix}"
# store_dir = ".task-cascade/instances"
# templates_path = "templates.toml"

[engine]
trigger_timeout_seconds = 10
propagate_automation = true

[executor]
# command = "./run-step.sh"   # spawned once per auto-executable task
# args = []
"#,
        task_prefix = task_prefix
    )
}
