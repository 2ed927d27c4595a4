//! servd: start-up harness for long-running network-service processes.

// Process sequencing
pub mod error;
pub mod options;
pub mod runner;

// Collaborators
pub mod config;
pub mod debug;
pub mod lifecycle;
pub mod observability;
pub mod persist;
pub mod plugin;
pub mod profiler;
pub mod reactor;
pub mod service;

// Built-in services
pub mod builtins;
pub mod net;

pub use error::{Error, Result};
pub use options::{parse_args, ApplicationSource, ParseOutcome, ServerOptions};
pub use plugin::{PluginRegistry, ServiceMaker};
pub use reactor::{Reactor, ReactorRegistry};
pub use runner::{ApplicationRunner, RunnerHooks, ServerHooks};
pub use service::{Application, Service};
