//! Lifecycle primitives shared by the reactor and the services.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop() / signal → watch channel flips → every subscriber wakes
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → reactor shutdown (or debug console when attached)
//!     SIGUSR2        → debug console (debug runs only)
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{Signal, SignalListener};
