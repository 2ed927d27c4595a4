//! TOML application definitions (`.tac`).
//!
//! ```toml
//! [application]
//! name = "edge"
//!
//! [[services]]
//! plugin = "echo"
//! name = "echo-7007"
//! args = ["--port", "7007"]
//! ```

use serde::Deserialize;

use crate::persist::{PersistError, Style};
use crate::plugin::{PluginError, PluginRegistry};
use crate::service::{ApplicationDescriptor, ServiceDescriptor};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    application: Option<ApplicationTable>,
    #[serde(default)]
    services: Vec<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplicationTable {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceEntry {
    plugin: String,
    name: Option<String>,
    #[serde(default)]
    args: Vec<String>,
}

/// Evaluate a definition into a descriptor, parsing each service's
/// `args` with its plugin's option schema.
pub fn parse(text: &str, plugins: &PluginRegistry) -> Result<ApplicationDescriptor, PersistError> {
    let file: DefinitionFile = toml::from_str(text).map_err(|e| PersistError::Decode {
        style: Style::Definition,
        message: e.to_string(),
    })?;

    let application = file.application.ok_or(PersistError::MissingApplication)?;
    let mut descriptor = ApplicationDescriptor::new(application.name);

    for entry in file.services {
        let maker = plugins
            .get(&entry.plugin)
            .ok_or_else(|| PluginError::UnknownPlugin(entry.plugin.clone()))?;
        let options = maker.parse_args(&entry.args)?;
        descriptor.services.push(ServiceDescriptor {
            name: entry.name.unwrap_or_else(|| entry.plugin.clone()),
            maker: entry.plugin,
            options,
        });
    }

    Ok(descriptor)
}
