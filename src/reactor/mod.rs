//! The reactor: the event loop servd applications run on.
//!
//! # Responsibilities
//! - Offer a closed set of reactor implementations selectable by short name
//! - Install exactly one of them, before any application is created
//! - Run the loop until stopped and fire system event triggers around it
//!
//! # Design Decisions
//! - A reactor is a Tokio runtime; the "reactor class" is the scheduler flavor
//! - Installation goes through a `OnceLock`, so a second install is an error
//!   instead of silently replacing the loop services were started on
//! - Signal handling is pluggable through [`InterruptHandler`] so the debug
//!   console can intercept interrupts

pub mod event_loop;
pub mod registry;
pub mod triggers;

use std::io;

use async_trait::async_trait;
use thiserror::Error;

pub use event_loop::{Reactor, ReactorStopper, RunState};
pub use registry::{Flavor, ReactorRegistry, ReactorType, DEFAULT_REACTOR};
pub use triggers::{Phase, SystemEvent, TriggerId, TriggerResult};

use crate::lifecycle::Signal;

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error(
        "The specified reactor does not exist: '{name}'.\nAvailable reactors: {}.\nSee the list of available reactors with --help-reactors",
        .available.join(", ")
    )]
    NoSuchReactor {
        name: String,
        available: Vec<&'static str>,
    },

    #[error("The specified reactor cannot be used: {0}")]
    Unusable(#[source] io::Error),

    #[error("A reactor is already installed ({installed}); cannot install '{requested}'")]
    AlreadyInstalled {
        installed: &'static str,
        requested: String,
    },

    #[error("The reactor has already run and cannot be restarted")]
    AlreadyRan,

    #[error("Failed to register signal handlers: {0}")]
    Signals(#[source] io::Error),
}

/// What the reactor does after a signal has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Resume,
    Shutdown,
}

/// Decides how the running reactor reacts to process signals.
#[async_trait]
pub trait InterruptHandler: Send {
    /// Whether SIGUSR2 should be delivered to this handler.
    fn watches_user_signal(&self) -> bool {
        false
    }

    async fn interrupted(&mut self, signal: Signal, reactor: ReactorType) -> Interruption;
}

/// Default handler: every signal shuts the reactor down.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShutdownOnSignal;

#[async_trait]
impl InterruptHandler for ShutdownOnSignal {
    async fn interrupted(&mut self, _signal: Signal, _reactor: ReactorType) -> Interruption {
        Interruption::Shutdown
    }
}
