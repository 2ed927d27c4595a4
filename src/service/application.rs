//! The top-level application: a named container of child services.

use std::sync::Arc;

use crate::plugin::{PluginError, PluginRegistry};
use crate::service::{ApplicationDescriptor, Service, ServiceError};

/// Application shared between the runner, shutdown triggers and the console.
pub type SharedApplication = Arc<tokio::sync::Mutex<Application>>;

/// Named container of uniquely-named child services.
///
/// Children start in insertion order and stop in reverse order.
#[derive(Debug)]
pub struct Application {
    name: String,
    services: Vec<Box<dyn Service>>,
    running: bool,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
            running: false,
        }
    }

    /// Rebuild an application from its descriptor, instantiating each child
    /// through the plugin registry.
    pub fn from_descriptor(
        descriptor: &ApplicationDescriptor,
        plugins: &PluginRegistry,
    ) -> Result<Self, ServiceError> {
        let mut app = Self::new(descriptor.name.clone());
        for child in &descriptor.services {
            let maker = plugins
                .get(&child.maker)
                .ok_or_else(|| PluginError::UnknownPlugin(child.maker.clone()))?;
            let mut service = maker.make_service(&child.options)?;
            service.set_name(child.name.clone());
            app.add_service(service)?;
        }
        Ok(app)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn into_shared(self) -> SharedApplication {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn add_service(&mut self, service: Box<dyn Service>) -> Result<(), ServiceError> {
        if self.get_service(service.name()).is_some() {
            return Err(ServiceError::DuplicateName(service.name().to_string()));
        }
        tracing::debug!(application = %self.name, service = service.name(), "Service added");
        self.services.push(service);
        Ok(())
    }

    pub fn remove_service(&mut self, name: &str) -> Option<Box<dyn Service>> {
        let index = self.services.iter().position(|s| s.name() == name)?;
        Some(self.services.remove(index))
    }

    pub fn get_service(&self, name: &str) -> Option<&dyn Service> {
        self.services
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn services(&self) -> impl Iterator<Item = &dyn Service> {
        self.services.iter().map(|s| s.as_ref())
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    pub fn descriptor(&self) -> ApplicationDescriptor {
        ApplicationDescriptor {
            name: self.name.clone(),
            services: self.services.iter().map(|s| s.descriptor()).collect(),
        }
    }

    /// Start every child in insertion order. Stops at the first failure.
    pub async fn start_service(&mut self) -> Result<(), ServiceError> {
        if self.running {
            return Err(ServiceError::AlreadyRunning(self.name.clone()));
        }
        self.running = true;

        for service in &mut self.services {
            service.start_service().await?;
            tracing::info!(application = %self.name, service = service.name(), "Service started");
        }
        Ok(())
    }

    /// Stop every running child in reverse order.
    ///
    /// A failing child does not keep the others running; the first error
    /// is returned once all have been asked to stop.
    pub async fn stop_service(&mut self) -> Result<(), ServiceError> {
        self.running = false;
        let mut first_error = None;

        for service in self.services.iter_mut().rev() {
            if !service.is_running() {
                continue;
            }
            match service.stop_service().await {
                Ok(()) => {
                    tracing::info!(application = %self.name, service = service.name(), "Service stopped");
                }
                Err(e) => {
                    tracing::error!(application = %self.name, service = service.name(), error = %e, "Service failed to stop");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::ServiceOptions;
    use crate::service::ServiceDescriptor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Probe {
        name: String,
        running: bool,
        fail_stop: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        fn boxed(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Service> {
            Box::new(Probe {
                name: name.to_string(),
                running: false,
                fail_stop: false,
                log: Arc::clone(log),
            })
        }
    }

    #[async_trait]
    impl Service for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn set_name(&mut self, name: String) {
            self.name = name;
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn descriptor(&self) -> ServiceDescriptor {
            ServiceDescriptor {
                name: self.name.clone(),
                maker: "probe".to_string(),
                options: ServiceOptions::new(),
            }
        }

        async fn start_service(&mut self) -> Result<(), ServiceError> {
            self.running = true;
            self.log.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop_service(&mut self) -> Result<(), ServiceError> {
            self.running = false;
            self.log.lock().unwrap().push(format!("stop {}", self.name));
            if self.fail_stop {
                return Err(ServiceError::Stop {
                    name: self.name.clone(),
                    message: "refused".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut app = Application::new("app");
        app.add_service(Probe::boxed("web", &log)).unwrap();

        let err = app.add_service(Probe::boxed("web", &log)).unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateName(ref n) if n == "web"));
        assert_eq!(app.service_names(), vec!["web"]);
    }

    #[tokio::test]
    async fn children_start_in_order_and_stop_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut app = Application::new("app");
        app.add_service(Probe::boxed("a", &log)).unwrap();
        app.add_service(Probe::boxed("b", &log)).unwrap();

        app.start_service().await.unwrap();
        assert!(app.is_running());
        app.stop_service().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }

    #[tokio::test]
    async fn stop_failure_still_stops_remaining_children() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut app = Application::new("app");
        app.add_service(Probe::boxed("a", &log)).unwrap();
        app.add_service(Box::new(Probe {
            name: "b".to_string(),
            running: false,
            fail_stop: true,
            log: Arc::clone(&log),
        }))
        .unwrap();

        app.start_service().await.unwrap();
        let err = app.stop_service().await.unwrap_err();

        assert!(matches!(err, ServiceError::Stop { ref name, .. } if name == "b"));
        assert!(app.services().all(|s| !s.is_running()));
        assert_eq!(log.lock().unwrap().last().unwrap(), "stop a");
    }

    #[test]
    fn descriptor_lists_children_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut app = Application::new("app");
        app.add_service(Probe::boxed("first", &log)).unwrap();
        app.add_service(Probe::boxed("second", &log)).unwrap();

        let descriptor = app.descriptor();
        assert_eq!(descriptor.name, "app");
        assert_eq!(descriptor.service_names(), vec!["first", "second"]);

        assert!(app.remove_service("first").is_some());
        assert!(app.get_service("first").is_none());
    }

    #[test]
    fn unknown_maker_fails_to_rebuild() {
        let mut descriptor = ApplicationDescriptor::new("app");
        descriptor.services.push(ServiceDescriptor {
            name: "x".to_string(),
            maker: "nosuchplugin".to_string(),
            options: ServiceOptions::new(),
        });

        let err = Application::from_descriptor(&descriptor, &PluginRegistry::builtin()).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Plugin(PluginError::UnknownPlugin(ref name)) if name == "nosuchplugin"
        ));
    }
}
