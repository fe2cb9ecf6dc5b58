use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted when no `--log-level` flag is given.
pub const LOG_LEVEL_ENV: &str = "TASK_CASCADE_LOG";

/// How much the engine writes to stderr. Each level includes the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    /// Out-of-range values clamp to the most verbose level.
    fn from_repr(raw: u8) -> LogLevel {
        Self::ALL
            .get(raw as usize)
            .copied()
            .unwrap_or(LogLevel::Debug)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        if wanted == "warning" {
            return Ok(LogLevel::Warn);
        }
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|l| l.as_str()).collect();
                format!("Unknown log level '{}' (one of: {})", raw, names.join(", "))
            })
    }
}

static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

pub fn set_log_level(level: LogLevel) {
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

pub fn current_log_level() -> LogLevel {
    LogLevel::from_repr(THRESHOLD.load(Ordering::Relaxed))
}

/// Whether a message at `level` would be written.
pub fn enabled(level: LogLevel) -> bool {
    level <= current_log_level()
}

/// Effective level: the flag if given, else a non-blank `TASK_CASCADE_LOG`,
/// else `Info`.
pub fn resolve_log_level(flag: Option<&str>) -> Result<LogLevel, String> {
    let env = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .filter(|raw| !raw.trim().is_empty());
    match flag.map(str::to_string).or(env) {
        Some(raw) => raw.parse(),
        None => Ok(LogLevel::Info),
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            eprintln!($($arg)*)
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log_at!($crate::log::LogLevel::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log_at!($crate::log::LogLevel::Warn, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log_at!($crate::log::LogLevel::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log_at!($crate::log::LogLevel::Debug, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back_to_their_level() {
        for level in LogLevel::ALL {
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
        }
        assert_eq!(" DEBUG ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    }

    #[test]
    fn unknown_level_lists_choices() {
        let err = "verbose".parse::<LogLevel>().unwrap_err();
        assert!(err.contains("'verbose'"), "got: {}", err);
        assert!(err.contains("error, warn, info, debug"), "got: {}", err);
    }

    #[test]
    fn flag_wins_without_consulting_env() {
        assert_eq!(resolve_log_level(Some("debug")).unwrap(), LogLevel::Debug);
        assert!(resolve_log_level(Some("loud")).is_err());
    }

    #[test]
    fn raw_values_past_debug_clamp() {
        assert_eq!(LogLevel::from_repr(1), LogLevel::Warn);
        assert_eq!(LogLevel::from_repr(200), LogLevel::Debug);
    }

    #[test]
    fn threshold_gates_enabled_levels() {
        // Tests share the global, so restore the default afterwards
        set_log_level(LogLevel::Warn);
        assert!(enabled(LogLevel::Error));
        assert!(enabled(LogLevel::Warn));
        assert!(!enabled(LogLevel::Info));

        set_log_level(LogLevel::Debug);
        assert_eq!(current_log_level(), LogLevel::Debug);
        assert!(enabled(LogLevel::Debug));
        set_log_level(LogLevel::Info);
    }
}
