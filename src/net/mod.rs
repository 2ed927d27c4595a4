//! Network layer used by the built-in TCP services.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (id + lifetime tracking)
//!     → server.rs (per-connection task, ConnectionHandler)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked so stopping a service can drain it

pub mod connection;
pub mod listener;
pub mod server;

pub use server::{ConnectionHandler, TcpService};
