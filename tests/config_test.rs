use std::time::Duration;

use task_cascade::cascade::CascadeOptions;
use task_cascade::config::*;

// --- Defaults ---

#[test]
fn missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();

    let config = load_config(dir.path()).unwrap();

    assert_eq!(config, TaskCascadeConfig::default());
    assert_eq!(config.project.task_prefix, "TSK");
    assert_eq!(config.engine.trigger_timeout_seconds, 10);
    assert!(config.engine.propagate_automation);
    assert_eq!(config.executor.command, None);
    assert_eq!(
        config.store_dir(dir.path()),
        dir.path().join(".task-cascade/instances")
    );
}

#[test]
fn default_options_match_default_engine_config() {
    let options = CascadeOptions::default();
    assert_eq!(options.trigger_timeout, Duration::from_secs(10));
    assert!(options.propagate_automation);
    assert_eq!(
        Duration::from_secs(TaskCascadeConfig::default().engine.trigger_timeout_seconds),
        options.trigger_timeout
    );
}

#[test]
fn init_contents_round_trip_through_loader() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        default_config_contents("UW"),
    )
    .unwrap();

    let config = load_config(dir.path()).unwrap();

    assert_eq!(config.project.task_prefix, "UW");
    assert_eq!(config.engine, EngineConfig::default());
}

// --- Parsing ---

#[test]
fn partial_sections_fill_in_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        r#"
[engine]
trigger_timeout_seconds = 3

[executor]
command = "./run-step.sh"
args = ["--quiet"]
"#,
    )
    .unwrap();

    let config = load_config(dir.path()).unwrap();

    assert_eq!(config.project, ProjectConfig::default());
    assert_eq!(config.engine.trigger_timeout_seconds, 3);
    assert!(config.engine.propagate_automation);
    assert_eq!(config.executor.command.as_deref(), Some("./run-step.sh"));
    assert_eq!(config.executor.args, vec!["--quiet"]);

    let options = CascadeOptions::from_config(&config.engine);
    assert_eq!(options.trigger_timeout, Duration::from_secs(3));
}

#[test]
fn explicit_config_path_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(
        &path,
        r#"
[project]
templates_path = "workflows/underwriting.toml"
"#,
    )
    .unwrap();

    let config = load_config_from(Some(&path), dir.path()).unwrap();

    assert_eq!(
        config.templates_path(dir.path()),
        dir.path().join("workflows/underwriting.toml")
    );
}

#[test]
fn missing_explicit_config_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.toml");

    let err = load_config_from(Some(&path), dir.path()).unwrap_err();

    assert!(err.contains("Config file not found"), "got: {}", err);
}

#[test]
fn malformed_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[engine\n").unwrap();

    let err = load_config(dir.path()).unwrap_err();

    assert!(err.contains("Failed to parse"), "got: {}", err);
}

// --- Validation ---

#[test]
fn validation_reports_every_problem() {
    let mut config = TaskCascadeConfig::default();
    config.project.task_prefix = "bad prefix".to_string();
    config.project.store_dir = " ".to_string();
    config.engine.trigger_timeout_seconds = 0;
    config.executor.args = vec!["--flag".to_string()];

    let errors = validate(&config).unwrap_err();

    assert_eq!(errors.len(), 4, "got: {:?}", errors);
    assert!(errors.iter().any(|e| e.contains("task_prefix")));
    assert!(errors.iter().any(|e| e.contains("store_dir")));
    assert!(errors.iter().any(|e| e.contains("trigger_timeout_seconds")));
    assert!(errors.iter().any(|e| e.contains("executor.args")));
}

#[test]
fn invalid_file_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "[engine]\ntrigger_timeout_seconds = 0\n",
    )
    .unwrap();

    let err = load_config(dir.path()).unwrap_err();

    assert!(err.contains("Config validation failed"), "got: {}", err);
}

#[test]
fn default_config_is_valid() {
    assert!(validate(&TaskCascadeConfig::default()).is_ok());
}
