//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT, SIGTERM, optionally SIGUSR2)
//! - Translate signals into [`Signal`] values for the reactor
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGUSR2 is only registered when a debug console is attached
//! - On non-Unix platforms only Ctrl+C is observed

use std::fmt;
use std::io;

#[cfg(unix)]
use tokio::signal::unix::{self, SignalKind};

/// A process signal the reactor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGUSR2.
    User2,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "SIGINT"),
            Signal::Terminate => write!(f, "SIGTERM"),
            Signal::User2 => write!(f, "SIGUSR2"),
        }
    }
}

/// Listens for the signals the reactor cares about.
///
/// Must be created from within a Tokio runtime.
#[derive(Debug)]
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: unix::Signal,
    #[cfg(unix)]
    terminate: unix::Signal,
    #[cfg(unix)]
    user2: Option<unix::Signal>,
}

impl SignalListener {
    /// Register handlers. `watch_user2` additionally arms SIGUSR2.
    #[cfg(unix)]
    pub fn new(watch_user2: bool) -> io::Result<Self> {
        let user2 = if watch_user2 {
            Some(unix::signal(SignalKind::user_defined2())?)
        } else {
            None
        };

        Ok(Self {
            interrupt: unix::signal(SignalKind::interrupt())?,
            terminate: unix::signal(SignalKind::terminate())?,
            user2,
        })
    }

    #[cfg(not(unix))]
    pub fn new(_watch_user2: bool) -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Signal {
        let Self {
            interrupt,
            terminate,
            user2,
        } = self;

        let user2 = async {
            match user2.as_mut() {
                Some(signal) => {
                    signal.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = interrupt.recv() => Signal::Interrupt,
            _ = terminate.recv() => Signal::Terminate,
            _ = user2 => Signal::User2,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Signal {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        Signal::Interrupt
    }
}
