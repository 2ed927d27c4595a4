//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check names against the closed sets they select from
//! - Validate value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config and the known reactor names

use crate::config::schema::ServerConfig;
use crate::observability::LogFormat;
use crate::profiler::SUPPORTED_PROFILERS;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate `config`; `reactors` are the installable reactor short names.
pub fn validate_config(config: &ServerConfig, reactors: &[&str]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(reactor) = &config.runner.reactor {
        if !reactors.contains(&reactor.as_str()) {
            errors.push(ValidationError {
                field: "runner.reactor",
                message: format!(
                    "unknown reactor '{}' (available: {})",
                    reactor,
                    reactors.join(", ")
                ),
            });
        }
    }

    if let Err(message) = config.logging.format.parse::<LogFormat>() {
        errors.push(ValidationError {
            field: "logging.format",
            message,
        });
    }

    if config.logging.rotate_length == 0 {
        errors.push(ValidationError {
            field: "logging.rotate_length",
            message: "must be greater than zero".to_string(),
        });
    }

    let profiler = config.profiling.profiler.to_ascii_lowercase();
    if !SUPPORTED_PROFILERS.contains(&profiler.as_str()) {
        errors.push(ValidationError {
            field: "profiling.profiler",
            message: format!("Unsupported profiler name: {}", config.profiling.profiler),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
