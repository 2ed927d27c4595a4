//! Profiled reactor runs.
//!
//! # Responsibilities
//! - Select a profiling backend by name (`spans` or `rusage`)
//! - Wrap exactly one blocking reactor run and write its report
//!
//! # Design Decisions
//! - The backend is chosen when the runner is built, so a bad name fails
//!   before any service starts
//! - A backend whose platform facility is missing is a fatal, explained
//!   error rather than a crash
//! - `--savestats` writes raw JSON instead of the text table

pub mod rusage;
pub mod spans;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use rusage::RusageProfiler;
pub use spans::{SpanStats, SpanTimingLayer, SpansProfiler};

use crate::options::ServerOptions;
use crate::reactor::{Reactor, ReactorError};

/// Backend names accepted by `--profiler`.
pub const SUPPORTED_PROFILERS: [&str; 2] = ["spans", "rusage"];

/// Report path when `--profile` was not given a value.
pub const DEFAULT_PROFILE_OUTPUT: &str = "servd.prof";

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("Unsupported profiler name: {0}")]
    Unsupported(String),

    #[error(
        "Failed to load profiler backend {backend}: {reason}\n\
         Run without --profile, or use a platform that provides {backend}."
    )]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("Failed to write profile to {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Reactor(#[from] ReactorError),
}

/// The profiler chosen for this run.
#[derive(Debug, Clone)]
pub enum AppProfiler {
    Spans(SpansProfiler),
    Rusage(RusageProfiler),
}

impl AppProfiler {
    pub fn new(options: &ServerOptions) -> Result<Self, ProfilerError> {
        let output = options
            .profile
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROFILE_OUTPUT));

        match options.profiler.to_ascii_lowercase().as_str() {
            "spans" => Ok(AppProfiler::Spans(SpansProfiler::new(output, options.savestats))),
            "rusage" => Ok(AppProfiler::Rusage(RusageProfiler::new(output, options.savestats))),
            _ => Err(ProfilerError::Unsupported(options.profiler.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AppProfiler::Spans(_) => "spans",
            AppProfiler::Rusage(_) => "rusage",
        }
    }

    /// Layer to install with logging, for backends that observe spans.
    pub fn layer(&self) -> Option<SpanTimingLayer> {
        match self {
            AppProfiler::Spans(p) => Some(p.layer().clone()),
            AppProfiler::Rusage(_) => None,
        }
    }

    /// Run `reactor` to completion under this profiler.
    pub fn run(&self, reactor: &Reactor) -> Result<(), ProfilerError> {
        tracing::info!(profiler = self.name(), "Running reactor under profiler");
        match self {
            AppProfiler::Spans(p) => p.run(reactor),
            AppProfiler::Rusage(p) => p.run(reactor),
        }
    }
}
