//! Reactor types and the single-install registry.

use std::fmt::Write as _;
use std::io;
use std::sync::{Arc, OnceLock};

use tokio::runtime::{Builder, Runtime};

use crate::reactor::{Reactor, ReactorError};

/// Short name of the reactor used when none is requested.
pub const DEFAULT_REACTOR: &str = "mt";

/// Which Tokio scheduler backs a reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    CurrentThread,
    MultiThread,
}

/// An installable reactor implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactorType {
    /// Name accepted by `--reactor`.
    pub short_name: &'static str,
    /// One-line description shown by `--help-reactors`.
    pub description: &'static str,
    pub flavor: Flavor,
}

impl ReactorType {
    pub(crate) fn build_runtime(&self) -> io::Result<Runtime> {
        let mut builder = match self.flavor {
            Flavor::CurrentThread => Builder::new_current_thread(),
            Flavor::MultiThread => Builder::new_multi_thread(),
        };
        builder
            .enable_all()
            .thread_name(format!("servd-{}", self.short_name))
            .build()
    }
}

/// The closed set of reactors plus the one that got installed.
///
/// Installation happens at most once per registry; the installed reactor is
/// immutable afterwards.
#[derive(Debug)]
pub struct ReactorRegistry {
    types: Vec<ReactorType>,
    installed: OnceLock<Arc<Reactor>>,
}

impl ReactorRegistry {
    pub fn new(types: Vec<ReactorType>) -> Self {
        Self {
            types,
            installed: OnceLock::new(),
        }
    }

    /// The reactors shipped with servd.
    pub fn builtin() -> Self {
        Self::new(vec![
            ReactorType {
                short_name: "ct",
                description: "Single-threaded reactor driving every task on the calling thread",
                flavor: Flavor::CurrentThread,
            },
            ReactorType {
                short_name: "mt",
                description: "Multi-threaded work-stealing reactor (default)",
                flavor: Flavor::MultiThread,
            },
        ])
    }

    pub fn reactor_types(&self) -> &[ReactorType] {
        &self.types
    }

    pub fn short_names(&self) -> Vec<&'static str> {
        self.types.iter().map(|t| t.short_name).collect()
    }

    /// Find a reactor type by short name.
    pub fn lookup(&self, short_name: &str) -> Result<ReactorType, ReactorError> {
        self.types
            .iter()
            .find(|t| t.short_name == short_name)
            .copied()
            .ok_or_else(|| ReactorError::NoSuchReactor {
                name: short_name.to_string(),
                available: self.short_names(),
            })
    }

    /// Build and install the named reactor.
    ///
    /// Fails without installing anything when the name is unknown or a
    /// reactor is already installed.
    pub fn install(&self, short_name: &str) -> Result<Arc<Reactor>, ReactorError> {
        let reactor_type = self.lookup(short_name)?;

        if let Some(existing) = self.installed.get() {
            return Err(ReactorError::AlreadyInstalled {
                installed: existing.short_name(),
                requested: short_name.to_string(),
            });
        }

        let reactor = Arc::new(Reactor::new(reactor_type)?);
        self.installed
            .set(Arc::clone(&reactor))
            .map_err(|_| ReactorError::AlreadyInstalled {
                installed: self
                    .installed
                    .get()
                    .map(|r| r.short_name())
                    .unwrap_or("unknown"),
                requested: short_name.to_string(),
            })?;

        tracing::debug!(reactor = reactor_type.short_name, "Reactor installed");
        Ok(reactor)
    }

    /// The installed reactor, if any.
    pub fn installed(&self) -> Option<Arc<Reactor>> {
        self.installed.get().cloned()
    }

    /// The installed reactor, installing [`DEFAULT_REACTOR`] first if needed.
    pub fn install_default(&self) -> Result<Arc<Reactor>, ReactorError> {
        match self.installed() {
            Some(reactor) => Ok(reactor),
            None => self.install(DEFAULT_REACTOR),
        }
    }

    /// Listing printed by `--help-reactors`.
    pub fn help_text(&self) -> String {
        let mut out = String::new();
        for t in &self.types {
            let _ = writeln!(out, "    {:<4}\t{}", t.short_name, t.description);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_reactor_installs_nothing() {
        let registry = ReactorRegistry::builtin();
        let err = registry.install("doesnotexist").unwrap_err();

        match &err {
            ReactorError::NoSuchReactor { name, available } => {
                assert_eq!(name, "doesnotexist");
                assert_eq!(available, &vec!["ct", "mt"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("--help-reactors"));
        assert!(registry.installed().is_none());
    }

    #[test]
    fn second_install_is_rejected() {
        let registry = ReactorRegistry::builtin();
        let first = registry.install("ct").unwrap();
        assert_eq!(first.short_name(), "ct");

        let err = registry.install("mt").unwrap_err();
        assert!(matches!(
            err,
            ReactorError::AlreadyInstalled { installed: "ct", .. }
        ));

        // install_default hands back what is already there
        let again = registry.install_default().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn help_text_lists_every_reactor() {
        let registry = ReactorRegistry::builtin();
        let text = registry.help_text();
        assert!(text.starts_with("    ct  \t"));
        assert!(text.contains("    mt  \tMulti-threaded"));
        assert_eq!(text.lines().count(), 2);
    }
}
