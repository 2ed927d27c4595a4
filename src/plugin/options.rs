//! String-keyed options handed to a service maker.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use clap::{ArgMatches, Command};
use serde::{Deserialize, Serialize};

use crate::plugin::PluginError;

/// Options a plugin's `make_service` receives.
///
/// Values are kept as the raw strings the user supplied (or the schema's
/// defaults), so they persist verbatim and are parsed again on rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceOptions(BTreeMap<String, String>);

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every argument of `command` that has a value in `matches`.
    ///
    /// Multi-valued arguments keep their last value.
    pub fn from_matches(command: &Command, matches: &ArgMatches) -> Self {
        let mut options = Self::new();
        for arg in command.get_arguments() {
            let id = arg.get_id().as_str();
            if id == "help" || id == "version" {
                continue;
            }
            if let Ok(Some(values)) = matches.try_get_raw(id) {
                if let Some(last) = values.last() {
                    options.insert(id, last.to_string_lossy());
                }
            }
        }
        options
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Required option, as a string.
    pub fn require(&self, plugin: &str, key: &str) -> Result<&str, PluginError> {
        self.get(key).ok_or_else(|| PluginError::MissingOption {
            plugin: plugin.to_string(),
            option: key.to_string(),
        })
    }

    /// Parse `key`, falling back to `default` when it is absent.
    pub fn parse_or<T>(&self, plugin: &str, key: &str, default: T) -> Result<T, PluginError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| PluginError::InvalidOption {
                plugin: plugin.to_string(),
                option: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
