//! Serializable descriptions of services and applications.
//!
//! A descriptor is what gets persisted: enough to rebuild a service
//! through its maker, not the live sockets and tasks themselves.

use serde::{Deserialize, Serialize};

use crate::plugin::ServiceOptions;

/// One child service: its name, the plugin that builds it, and that plugin's options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Tapname of the [`ServiceMaker`](crate::plugin::ServiceMaker) to rebuild with.
    pub maker: String,
    #[serde(default)]
    pub options: ServiceOptions,
}

/// A whole application, in child insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    pub name: String,
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

impl ApplicationDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
        }
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }
}
