//! Configuration schema definitions.
//!
//! Defaults for the command line, read from an optional TOML file. Every
//! field has a default so a minimal (or empty) file is valid.

use serde::{Deserialize, Serialize};

use crate::observability::logfile::{DEFAULT_MAX_ROTATED_FILES, DEFAULT_ROTATE_LENGTH};

/// Root of the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub logging: LoggingConfig,
    pub runner: RunnerConfig,
    pub profiling: ProfilingConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives (e.g. "info" or "servd=debug").
    pub level: String,

    /// "full", "compact" or "pretty".
    pub format: String,

    /// Log file; "-" means stdout.
    pub file: Option<String>,

    /// Size in bytes at which the log file is rotated.
    pub rotate_length: u64,

    pub max_rotated_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
            file: None,
            rotate_length: DEFAULT_ROTATE_LENGTH,
            max_rotated_files: DEFAULT_MAX_ROTATED_FILES,
        }
    }
}

/// Runner settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Directory to change into before loading the application.
    pub rundir: String,

    /// Reactor short name.
    pub reactor: Option<String>,

    /// Where crash reports go when not running in the foreground.
    pub crash_log: String,

    pub nodaemon: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            rundir: ".".to_string(),
            reactor: None,
            crash_log: "SERVD-CRASH.log".to_string(),
            nodaemon: false,
        }
    }
}

/// Profiling settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProfilingConfig {
    pub profiler: String,
    pub save_stats: bool,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            profiler: "spans".to_string(),
            save_stats: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.runner.crash_log, "SERVD-CRASH.log");
        assert_eq!(config.logging.rotate_length, 1_000_000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [runner]
            reactor = "ct"

            [profiling]
            save_stats = true
            "#,
        )
        .unwrap();

        assert_eq!(config.runner.reactor.as_deref(), Some("ct"));
        assert_eq!(config.runner.rundir, ".");
        assert!(config.profiling.save_stats);
        assert_eq!(config.profiling.profiler, "spans");
    }
}
