//! Debug runs: an interactive console in place of signal-driven shutdown.

pub mod console;

pub use console::{ConsoleCommand, DebugConsole, SessionEnd};
