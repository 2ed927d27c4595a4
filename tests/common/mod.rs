//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use servd::observability::LogObserver;
use servd::persist::{Persistable, Style};
use servd::plugin::ServiceOptions;
use servd::profiler::SpanTimingLayer;
use servd::reactor::Reactor;
use servd::runner::{self, PostApplication};
use servd::service::{ApplicationDescriptor, ServiceDescriptor};
use servd::{ApplicationSource, RunnerHooks, ServerOptions};
use uuid::Uuid;

/// argv for servd, program name first.
pub fn argv(args: &[&str]) -> Vec<String> {
    std::iter::once("servd")
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect()
}

/// Echo options bound to an ephemeral loopback port.
pub fn loopback_echo() -> ServiceOptions {
    ServiceOptions::new()
        .with("port", "0")
        .with("interface", "127.0.0.1")
}

/// An application with one loopback echo service per name.
pub fn echo_application(name: &str, children: &[&str]) -> ApplicationDescriptor {
    let mut descriptor = ApplicationDescriptor::new(name);
    for child in children {
        descriptor.services.push(ServiceDescriptor {
            name: child.to_string(),
            maker: "echo".to_string(),
            options: loopback_echo(),
        });
    }
    descriptor
}

/// Save `descriptor` to `path` in `style`.
pub fn write_application(path: &Path, style: Style, descriptor: &ApplicationDescriptor) {
    Persistable::new(path, style).save(descriptor).unwrap();
}

/// Options for a foreground run of the application stored at `path`.
pub fn persisted_options(path: &Path, style: Style) -> ServerOptions {
    ServerOptions {
        source: ApplicationSource::Persisted {
            path: path.to_path_buf(),
            style,
        },
        nodaemon: true,
        ..ServerOptions::default()
    }
}

/// What a [`TestHooks`] run observed.
#[derive(Debug, Default)]
pub struct Observed {
    pub pre_application_calls: usize,
    pub application_name: Option<String>,
    pub running_services: Vec<String>,
    pub saving: bool,
}

/// Runner hooks for tests.
///
/// Skips the global subscriber, starts the services, then stops the reactor
/// before running it so the run completes a full clean shutdown at once.
#[derive(Debug, Clone, Default)]
pub struct TestHooks {
    pub observed: Arc<Mutex<Observed>>,
}

impl RunnerHooks for TestHooks {
    fn pre_application(&mut self, _options: &ServerOptions) -> servd::Result<()> {
        self.observed.lock().unwrap().pre_application_calls += 1;
        Ok(())
    }

    fn start_logging(
        &mut self,
        _options: &ServerOptions,
        _observer: LogObserver,
        _reactor: &Reactor,
        _profiling: Option<SpanTimingLayer>,
        _run_id: Uuid,
    ) -> servd::Result<()> {
        Ok(())
    }

    fn post_application(&mut self, run: PostApplication<'_>) -> servd::Result<()> {
        {
            let mut observed = self.observed.lock().unwrap();
            observed.application_name = Some(run.application.name().to_string());
            observed.saving = run.persistable.is_some();
        }

        let application = runner::start_application(&run.reactor, run.application, run.persistable)?;
        let running = run.reactor.block_on(async {
            let app = application.lock().await;
            app.services()
                .filter(|s| s.is_running())
                .map(|s| s.name().to_string())
                .collect::<Vec<_>>()
        });
        self.observed.lock().unwrap().running_services = running;

        run.reactor.stop();
        runner::run_reactor_with_logging(run.options, &application, &run.reactor, run.profiler, run.run_id)
    }
}
