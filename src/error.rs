//! Top-level error type.
//!
//! Every failure a servd run can end with, grouped the way the process
//! exits: usage errors (status 2, or 0 for help output), fatal errors
//! before or around the reactor (status 1), and crashed runs (status 1,
//! after the crash report has been written).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::observability::LoggingError;
use crate::options::OptionsError;
use crate::persist::PersistError;
use crate::plugin::PluginError;
use crate::profiler::ProfilerError;
use crate::reactor::ReactorError;
use crate::service::ServiceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reactor(#[from] ReactorError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Profiler(#[from] ProfilerError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("{0}")]
    LoadApplication(String),

    #[error("Failed to change to run directory {}: {source}", .path.display())]
    Rundir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read passphrase: {0}")]
    Passphrase(#[source] io::Error),

    #[error("servd crashed; the crash report was written to {sink}")]
    Crashed { sink: String },
}

impl Error {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Options(e) => e.exit_code(),
            _ => 1,
        }
    }

    /// Whether the run got as far as the reactor and crashed there.
    pub fn is_crash(&self) -> bool {
        matches!(self, Error::Crashed { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
