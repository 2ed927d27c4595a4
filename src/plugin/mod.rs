//! Service-maker plugins.
//!
//! # Responsibilities
//! - Define the [`ServiceMaker`] contract: a tapname, a description, an
//!   option schema and a factory for the service
//! - Keep the makers in an explicit [`PluginRegistry`]
//!
//! # Design Decisions
//! - Each maker's option schema is a `clap::Command`; it becomes the
//!   maker's sub-command on the servd command line and parses the `args`
//!   of definition files
//! - Parsed options are stored as raw strings so they can be persisted

pub mod options;
pub mod registry;

use thiserror::Error;

pub use options::ServiceOptions;
pub use registry::PluginRegistry;

use crate::service::Service;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("No plugin with tapname '{0}' is registered")]
    UnknownPlugin(String),

    #[error("A plugin with tapname '{0}' is already registered")]
    Duplicate(&'static str),

    #[error("Invalid value for option '{option}' of plugin '{plugin}': {message}")]
    InvalidOption {
        plugin: String,
        option: String,
        message: String,
    },

    #[error("Plugin '{plugin}' requires option '{option}'")]
    MissingOption { plugin: String, option: String },

    #[error(transparent)]
    Usage(#[from] clap::Error),
}

/// A factory for one kind of service, exposed as a sub-command.
pub trait ServiceMaker: Send + Sync {
    /// Sub-command name.
    fn tapname(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Option schema. Its name and about text are replaced by
    /// [`tapname`](Self::tapname) and [`description`](Self::description).
    fn options(&self) -> clap::Command;

    fn make_service(&self, options: &ServiceOptions) -> Result<Box<dyn Service>, PluginError>;

    /// The schema as a servd sub-command.
    fn command(&self) -> clap::Command {
        self.options()
            .name(self.tapname())
            .about(self.description())
    }

    /// Parse a bare argument list (no program name) against the schema.
    fn parse_args(&self, args: &[String]) -> Result<ServiceOptions, PluginError> {
        let command = self.command().no_binary_name(true);
        let matches = command.clone().try_get_matches_from(args)?;
        Ok(ServiceOptions::from_matches(&command, &matches))
    }
}
