use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ExecutorConfig;
use crate::types::TriggerRequest;
use crate::{log_debug, log_info, log_warn};

pub const ENV_INSTANCE_ID: &str = "TASK_CASCADE_INSTANCE_ID";
pub const ENV_TASK_ID: &str = "TASK_CASCADE_TASK_ID";
pub const ENV_TEMPLATE_ID: &str = "TASK_CASCADE_TEMPLATE_ID";
pub const ENV_REQUEST: &str = "TASK_CASCADE_REQUEST";

/// Hands an auto-executable task to whatever runs it.
///
/// Fire-and-forget: `Ok(())` means the executor accepted the request, not
/// that the task's work is done. Retrying a failed hand-off is the caller's
/// (or operator's) concern.
pub trait ExecutorTrigger: Send + Sync {
    fn trigger_execution(
        &self,
        request: &TriggerRequest,
    ) -> impl Future<Output = Result<(), String>> + Send;
}

// --- Subprocess trigger ---

/// Spawns a configured command per request, in its own process group, and
/// does not wait for it.
pub struct CommandTrigger {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTrigger {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    fn build_command(&self, request: &TriggerRequest) -> Result<tokio::process::Command, String> {
        let payload = serde_json::to_string(request)
            .map_err(|e| format!("Failed to serialize trigger request: {}", e))?;

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd.env(ENV_INSTANCE_ID, &request.instance_id);
        cmd.env(ENV_TASK_ID, &request.task_id);
        cmd.env(ENV_TEMPLATE_ID, &request.template_id);
        cmd.env(ENV_REQUEST, payload);

        // stdin MUST be null: the child runs in a background process group
        // and a terminal read would stop it with SIGTTIN.
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::inherit());
        cmd.stderr(std::process::Stdio::inherit());

        // SAFETY: pre_exec runs between fork() and exec() where only
        // async-signal-safe functions are permitted. setpgid is one.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setpgid(nix::unistd::Pid::from_raw(0), nix::unistd::Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;
                Ok(())
            });
        }

        Ok(cmd)
    }
}

impl ExecutorTrigger for CommandTrigger {
    async fn trigger_execution(&self, request: &TriggerRequest) -> Result<(), String> {
        let mut cmd = self.build_command(request)?;
        let mut child = cmd
            .spawn()
            .map_err(|e| format!("Failed to spawn executor '{}': {}", self.program, e))?;

        let pid = child.id().unwrap_or_default();
        log_debug!(
            "[trigger] Spawned executor for {}/{} (pid={})",
            request.instance_id,
            request.task_id,
            pid
        );

        // Reap in the background so the child never lingers as a zombie
        let task_id = request.task_id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => log_debug!("[trigger] Executor for {} exited: {}", task_id, status),
                Err(e) => log_warn!("[trigger] Failed to wait on executor for {}: {}", task_id, e),
            }
        });

        Ok(())
    }
}

// --- Log-only trigger ---

/// Used when no executor command is configured.
pub struct LogOnlyTrigger;

impl ExecutorTrigger for LogOnlyTrigger {
    async fn trigger_execution(&self, request: &TriggerRequest) -> Result<(), String> {
        log_info!(
            "[trigger] {}/{} ({}) is ready for automated execution (no executor configured)",
            request.instance_id,
            request.task_id,
            request.template_id
        );
        Ok(())
    }
}

// --- Configured trigger ---

/// The trigger the CLI builds from `[executor]` config.
pub enum ConfiguredTrigger {
    Command(CommandTrigger),
    LogOnly(LogOnlyTrigger),
}

impl ConfiguredTrigger {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        match config.command.as_deref().map(str::trim) {
            Some(program) if !program.is_empty() => {
                ConfiguredTrigger::Command(CommandTrigger::new(program, config.args.clone()))
            }
            _ => ConfiguredTrigger::LogOnly(LogOnlyTrigger),
        }
    }
}

impl ExecutorTrigger for ConfiguredTrigger {
    async fn trigger_execution(&self, request: &TriggerRequest) -> Result<(), String> {
        match self {
            ConfiguredTrigger::Command(trigger) => trigger.trigger_execution(request).await,
            ConfiguredTrigger::LogOnly(trigger) => trigger.trigger_execution(request).await,
        }
    }
}

// --- Recording trigger ---

/// Test double: records every request, and can be told to fail or stall for
/// specific task ids.
#[derive(Default)]
pub struct RecordingTrigger {
    requests: Mutex<Vec<TriggerRequest>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request for the given task ids (they are still recorded).
    pub fn failing_for(task_ids: &[&str]) -> Self {
        Self {
            failing: task_ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Sleep before accepting each request, to exercise timeouts.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<TriggerRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn triggered_task_ids(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.task_id).collect()
    }

    pub fn count_for(&self, task_id: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.task_id == task_id)
            .count()
    }
}

impl ExecutorTrigger for RecordingTrigger {
    async fn trigger_execution(&self, request: &TriggerRequest) -> Result<(), String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&request.task_id) {
            return Err(format!("executor rejected {}", request.task_id));
        }
        Ok(())
    }
}
