//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber once per process
//! - Route log output to the chosen observer (stdout or a rotated file)
//! - Emit the start-up banner
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured filter
//! - The span profiler rides along as an extra layer so it sees every span
//!   without being part of the output path

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};
use uuid::Uuid;

use crate::observability::logfile::LogFile;
use crate::profiler::SpanTimingLayer;
use crate::reactor::Reactor;

/// Log file used by daemonized runs when none is given.
pub const DEFAULT_LOG_FILE: &str = "servd.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("Failed to open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Logging is already initialized: {0}")]
    Init(#[from] TryInitError),
}

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}' (expected full, compact or pretty)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Full => "full",
            LogFormat::Compact => "compact",
            LogFormat::Pretty => "pretty",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub format: LogFormat,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Full,
            filter: "info".to_string(),
            ansi: false,
        }
    }
}

/// Where log events go.
#[derive(Debug, Clone)]
pub enum LogObserver {
    Stdout,
    File(LogFile),
}

impl LogObserver {
    /// Pick the observer for a run.
    ///
    /// `-` means stdout; no log file means stdout when not daemonized and
    /// [`DEFAULT_LOG_FILE`] otherwise.
    pub fn choose(
        logfile: Option<&PathBuf>,
        nodaemon: bool,
        rotate_length: u64,
        max_rotated_files: usize,
    ) -> Result<Self, LoggingError> {
        let path = match logfile {
            Some(p) if p.as_os_str() == "-" => return Ok(LogObserver::Stdout),
            Some(p) => p.clone(),
            None if nodaemon => return Ok(LogObserver::Stdout),
            None => PathBuf::from(DEFAULT_LOG_FILE),
        };

        LogFile::open(&path, rotate_length, max_rotated_files)
            .map(LogObserver::File)
            .map_err(|source| LoggingError::LogFile { path, source })
    }

    pub fn is_stdout(&self) -> bool {
        matches!(self, LogObserver::Stdout)
    }

    fn make_writer(&self) -> BoxMakeWriter {
        match self {
            LogObserver::Stdout => BoxMakeWriter::new(io::stdout),
            LogObserver::File(file) => BoxMakeWriter::new(file.clone()),
        }
    }
}

/// Install the global subscriber.
pub fn init(
    settings: &LogSettings,
    observer: &LogObserver,
    profiling: Option<SpanTimingLayer>,
) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter).map_err(|e| LoggingError::Filter {
            filter: settings.filter.clone(),
            message: e.to_string(),
        })?,
    };

    let base = tracing_subscriber::fmt::layer()
        .with_writer(observer.make_writer())
        .with_ansi(settings.ansi && observer.is_stdout());
    let output: Box<dyn Layer<Registry> + Send + Sync> = match settings.format {
        LogFormat::Full => base.boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .with(profiling)
        .try_init()?;
    Ok(())
}

/// The start-up banner.
pub fn initial_log(reactor: &Reactor, run_id: Uuid) {
    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "servd".to_string());

    tracing::info!(
        %run_id,
        "servd {} ({} {}/{}) starting up",
        env!("CARGO_PKG_VERSION"),
        exe,
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    tracing::info!("reactor class: {}", reactor);
}
