//! Configuration file support.
//!
//! # Data Flow
//! ```text
//! --config / SERVD_CONFIG (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (defaults for the command line)
//!     → options.rs merges it under the command-line values
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Command-line values always win over file values

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{LoggingConfig, ProfilingConfig, RunnerConfig, ServerConfig};
