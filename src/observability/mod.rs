//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → spans (per connection, per shutdown trigger)
//!
//! Consumers:
//!     → logging.rs (fmt layer → stdout or logfile.rs)
//!     → profiler::spans (span timing, profiled runs only)
//! ```

pub mod logfile;
pub mod logging;

pub use logfile::LogFile;
pub use logging::{LogFormat, LogObserver, LogSettings, LoggingError};
