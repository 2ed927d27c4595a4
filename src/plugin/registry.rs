//! The explicit set of service makers servd knows about.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::builtins::{EchoMaker, PortForwardMaker};
use crate::plugin::{PluginError, ServiceMaker};

/// Service makers keyed by tapname.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    makers: BTreeMap<&'static str, Arc<dyn ServiceMaker>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the makers shipped with servd.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for maker in [
            Arc::new(EchoMaker) as Arc<dyn ServiceMaker>,
            Arc::new(PortForwardMaker),
        ] {
            // Built-in tapnames are distinct.
            let _ = registry.register(maker);
        }
        registry
    }

    pub fn register(&mut self, maker: Arc<dyn ServiceMaker>) -> Result<(), PluginError> {
        let tapname = maker.tapname();
        if self.makers.contains_key(tapname) {
            return Err(PluginError::Duplicate(tapname));
        }
        self.makers.insert(tapname, maker);
        Ok(())
    }

    pub fn get(&self, tapname: &str) -> Option<&Arc<dyn ServiceMaker>> {
        self.makers.get(tapname)
    }

    /// Makers in tapname order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ServiceMaker>> {
        self.makers.values()
    }

    pub fn tapnames(&self) -> Vec<&'static str> {
        self.makers.keys().copied().collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("tapnames", &self.tapnames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_makers_are_registered() {
        let registry = PluginRegistry::builtin();
        assert_eq!(registry.tapnames(), vec!["echo", "portforward"]);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("web").is_none());
    }

    #[test]
    fn duplicate_tapname_is_an_error() {
        let mut registry = PluginRegistry::builtin();
        let err = registry.register(Arc::new(EchoMaker)).unwrap_err();
        assert!(matches!(err, PluginError::Duplicate("echo")));
    }
}
