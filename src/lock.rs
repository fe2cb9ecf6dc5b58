use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::{log_debug, log_warn};

pub const LOCK_FILE_NAME: &str = "task-cascade.lock";
pub const PID_FILE_NAME: &str = "task-cascade.pid";

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Files that make up the store lock inside a runtime directory.
#[derive(Debug, Clone)]
struct LockPaths {
    lock: PathBuf,
    pid: PathBuf,
}

impl LockPaths {
    fn in_dir(runtime_dir: &Path) -> Self {
        Self {
            lock: runtime_dir.join(LOCK_FILE_NAME),
            pid: runtime_dir.join(PID_FILE_NAME),
        }
    }

    fn recorded_holder(&self) -> Option<i32> {
        fs::read_to_string(&self.pid).ok()?.trim().parse().ok()
    }

    /// Explain a lost `try_lock`, naming the holder when the PID file allows.
    fn contention_error(&self) -> String {
        match self.recorded_holder() {
            Some(pid) if is_pid_alive(pid) => format!(
                "Another task-cascade process is updating this store (PID {})",
                pid
            ),
            Some(pid) => format!(
                "Store lock {} is held, but its recorded owner (PID {}) has exited; \
                 delete {} and {} if no task-cascade process is running",
                self.lock.display(),
                pid,
                self.lock.display(),
                self.pid.display()
            ),
            None => format!(
                "Store lock {} is held by a process that left no PID file",
                self.lock.display()
            ),
        }
    }
}

/// Exclusive hold on a store's runtime directory, for one CLI invocation.
///
/// Writes within a process already go through the store actor; this covers
/// separate processes pointed at the same store. Dropping the guard unlocks
/// and removes the PID file.
#[must_use = "the store is unlocked as soon as the guard is dropped"]
pub struct LockGuard {
    file: fslock::LockFile,
    paths: LockPaths,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("lock", &self.paths.lock)
            .finish_non_exhaustive()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut problems = Vec::new();
        if let Err(e) = self.file.unlock() {
            problems.push(format!("unlock {}: {}", self.paths.lock.display(), e));
        }
        if let Err(e) = fs::remove_file(&self.paths.pid) {
            problems.push(format!("remove {}: {}", self.paths.pid.display(), e));
        }
        if !problems.is_empty() {
            log_warn!("[lock] Release incomplete: {}", problems.join("; "));
        }
    }
}

/// Take the lock in `runtime_dir` without waiting, creating the directory if
/// needed.
pub fn try_acquire(runtime_dir: &Path) -> Result<LockGuard, String> {
    fs::create_dir_all(runtime_dir)
        .map_err(|e| format!("Cannot create runtime dir {}: {}", runtime_dir.display(), e))?;
    let paths = LockPaths::in_dir(runtime_dir);

    let mut file = fslock::LockFile::open(&paths.lock)
        .map_err(|e| format!("Cannot open {}: {}", paths.lock.display(), e))?;
    let won = file
        .try_lock()
        .map_err(|e| format!("Cannot lock {}: {}", paths.lock.display(), e))?;
    if !won {
        return Err(paths.contention_error());
    }

    fs::write(&paths.pid, std::process::id().to_string())
        .map_err(|e| format!("Cannot record PID in {}: {}", paths.pid.display(), e))?;

    Ok(LockGuard { file, paths })
}

/// Like `try_acquire`, but keeps retrying until `wait` has elapsed. Another
/// invocation's cascade usually finishes well inside that window.
pub fn acquire_with_wait(runtime_dir: &Path, wait: Duration) -> Result<LockGuard, String> {
    let deadline = Instant::now() + wait;
    let mut attempt = 1u32;
    loop {
        let err = match try_acquire(runtime_dir) {
            Ok(guard) => return Ok(guard),
            Err(err) => err,
        };
        if Instant::now() >= deadline {
            return Err(err);
        }
        log_debug!("[lock] Attempt {} failed ({}), retrying", attempt, err);
        attempt += 1;
        std::thread::sleep(RETRY_INTERVAL);
    }
}

fn is_pid_alive(pid: i32) -> bool {
    // signal 0 checks that the process exists
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive() {
        assert!(is_pid_alive(std::process::id() as i32));
    }

    #[test]
    fn unused_pid_is_not_alive() {
        assert!(!is_pid_alive(99_999_999));
    }

    #[test]
    fn contention_names_exited_owner() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LockPaths::in_dir(dir.path());
        fs::write(&paths.pid, "99999999\n").unwrap();

        let message = paths.contention_error();
        assert!(message.contains("PID 99999999"), "got: {}", message);
        assert!(message.contains("has exited"), "got: {}", message);
    }

    #[test]
    fn contention_without_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LockPaths::in_dir(dir.path());

        assert_eq!(paths.recorded_holder(), None);
        assert!(paths.contention_error().contains("left no PID file"));
    }

    #[test]
    fn garbage_pid_file_has_no_holder() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LockPaths::in_dir(dir.path());
        fs::write(&paths.pid, "not-a-pid").unwrap();

        assert_eq!(paths.recorded_holder(), None);
    }
}
