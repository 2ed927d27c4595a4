//! Services and the application container.
//!
//! # Responsibilities
//! - Define the [`Service`] lifecycle every long-running component implements
//! - Group services under a named [`Application`]
//! - Describe both in a serializable form for persistence
//!
//! # Design Decisions
//! - Services are started and stopped asynchronously on the installed reactor
//! - The application is shared with shutdown triggers and the debug console
//!   behind a Tokio mutex ([`SharedApplication`])

pub mod application;
pub mod descriptor;

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use application::{Application, SharedApplication};
pub use descriptor::{ApplicationDescriptor, ServiceDescriptor};

use crate::plugin::PluginError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("A service named '{0}' is already part of this application")]
    DuplicateName(String),

    #[error("Service '{name}' failed to start: {source}")]
    Start {
        name: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Service '{name}' failed to stop: {message}")]
    Stop { name: String, message: String },

    #[error("Service '{0}' is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// A long-running component owned by an [`Application`].
#[async_trait]
pub trait Service: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    fn is_running(&self) -> bool;

    /// What to persist so the service can be rebuilt later.
    fn descriptor(&self) -> ServiceDescriptor;

    async fn start_service(&mut self) -> Result<(), ServiceError>;

    async fn stop_service(&mut self) -> Result<(), ServiceError>;
}
