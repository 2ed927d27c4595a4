//! The application runner.
//!
//! # Data Flow
//! ```text
//! ApplicationRunner::new   (profiler chosen, reactor installed)
//!     → pre_application       hook: chdir to rundir
//!     → create_or_get_application
//!           plugin sub-command → Application{tapname}[service]
//!           application file   → [passphrase] → load → rebuild services
//!     → log_observer + start_logging
//!     → post_application      hook: start services, register shutdown
//!                             triggers, run the reactor (plain / debug /
//!                             profiled) under crash capture
//! ```
//!
//! # Design Decisions
//! - The application does not exist yet when `pre_application` runs
//! - Shutdown stops services (before) and then saves (after), so the saved
//!   descriptor reflects the stopped application
//! - Anything escaping the reactor run is reported once, then the run ends

pub mod crash;

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::debug::DebugConsole;
use crate::error::{Error, Result};
use crate::observability::logging::{self, LogObserver};
use crate::options::{ApplicationSource, ServerOptions};
use crate::persist::{PersistError, Persistable};
use crate::plugin::{PluginError, PluginRegistry};
use crate::profiler::{AppProfiler, ProfilerError, SpanTimingLayer};
use crate::reactor::{Phase, Reactor, ReactorRegistry, SystemEvent, TriggerResult};
use crate::service::{Application, SharedApplication};

use self::crash::{catch_crash, Caught, CrashReport, CrashSink};

/// Source of the passphrase for encrypted application files.
pub trait PassphrasePrompt {
    fn prompt(&mut self, message: &str) -> io::Result<String>;
}

/// Reads the passphrase from the terminal without echo.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PassphrasePrompt for TerminalPrompt {
    fn prompt(&mut self, message: &str) -> io::Result<String> {
        rpassword::prompt_password(message)
    }
}

impl<F> PassphrasePrompt for F
where
    F: FnMut(&str) -> io::Result<String>,
{
    fn prompt(&mut self, message: &str) -> io::Result<String> {
        self(message)
    }
}

/// Everything `post_application` needs to run the loaded application.
pub struct PostApplication<'a> {
    pub options: &'a ServerOptions,
    pub application: Application,
    pub reactor: Arc<Reactor>,
    pub profiler: &'a AppProfiler,
    /// Where to save on shutdown; `None` when saving is disabled.
    pub persistable: Option<Persistable>,
    pub run_id: Uuid,
}

/// Customization points of a run.
pub trait RunnerHooks {
    /// Runs before the application exists.
    fn pre_application(&mut self, options: &ServerOptions) -> Result<()>;

    fn log_observer(&mut self, options: &ServerOptions) -> Result<LogObserver> {
        Ok(LogObserver::choose(
            options.logfile.as_ref(),
            options.nodaemon,
            options.rotate_length,
            options.max_rotated_files,
        )?)
    }

    fn start_logging(
        &mut self,
        options: &ServerOptions,
        observer: LogObserver,
        reactor: &Reactor,
        profiling: Option<SpanTimingLayer>,
        run_id: Uuid,
    ) -> Result<()> {
        logging::init(&options.log_settings(), &observer, profiling)?;
        let _ = io::stdout().flush();
        logging::initial_log(reactor, run_id);
        Ok(())
    }

    fn post_application(&mut self, run: PostApplication<'_>) -> Result<()>;
}

/// The standard hooks used by the `servd` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerHooks;

impl RunnerHooks for ServerHooks {
    fn pre_application(&mut self, options: &ServerOptions) -> Result<()> {
        if options.rundir != Path::new(".") {
            std::env::set_current_dir(&options.rundir).map_err(|source| Error::Rundir {
                path: options.rundir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn post_application(&mut self, run: PostApplication<'_>) -> Result<()> {
        let application = start_application(&run.reactor, run.application, run.persistable)?;
        run_reactor_with_logging(run.options, &application, &run.reactor, run.profiler, run.run_id)
    }
}

/// Sequences one servd run.
pub struct ApplicationRunner<H> {
    options: ServerOptions,
    plugins: Arc<PluginRegistry>,
    reactor: Arc<Reactor>,
    profiler: AppProfiler,
    hooks: H,
    prompt: Box<dyn PassphrasePrompt>,
    run_id: Uuid,
}

impl<H: RunnerHooks> ApplicationRunner<H> {
    /// Choose the profiler and make sure a reactor is installed.
    ///
    /// An unsupported profiler name fails here, before anything runs.
    pub fn new(
        options: ServerOptions,
        plugins: Arc<PluginRegistry>,
        reactors: &ReactorRegistry,
        hooks: H,
    ) -> Result<Self> {
        let profiler = AppProfiler::new(&options)?;
        let reactor = reactors.install_default()?;

        Ok(Self {
            options,
            plugins,
            reactor,
            profiler,
            hooks,
            prompt: Box::new(TerminalPrompt),
            run_id: Uuid::new_v4(),
        })
    }

    pub fn with_passphrase_prompt(mut self, prompt: impl PassphrasePrompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn run(mut self) -> Result<()> {
        self.hooks.pre_application(&self.options)?;

        let (application, persistable) = self.create_or_get_application()?;

        let observer = self.hooks.log_observer(&self.options)?;
        let profiling = if self.options.is_profiled() {
            self.profiler.layer()
        } else {
            None
        };
        self.hooks
            .start_logging(&self.options, observer, &self.reactor, profiling, self.run_id)?;

        if let Some(email) = &self.options.report_profile {
            tracing::warn!(%email, "--report-profile is deprecated and has no effect");
        }

        let persistable = if self.options.no_save { None } else { persistable };
        self.hooks.post_application(PostApplication {
            options: &self.options,
            application,
            reactor: Arc::clone(&self.reactor),
            profiler: &self.profiler,
            persistable,
            run_id: self.run_id,
        })
    }

    /// Build the application from a plugin, or load it from its file.
    ///
    /// Also returns where a loaded application came from, for saving back.
    pub fn create_or_get_application(&mut self) -> Result<(Application, Option<Persistable>)> {
        match self.options.source.clone() {
            ApplicationSource::Plugin { tapname, options } => {
                let maker = self
                    .plugins
                    .get(&tapname)
                    .ok_or_else(|| PluginError::UnknownPlugin(tapname.clone()))?;
                let service = maker.make_service(&options)?;

                let mut application = Application::new(tapname);
                application.add_service(service)?;
                Ok((application, None))
            }
            ApplicationSource::Persisted { path, style } => {
                let passphrase = if self.options.encrypted {
                    Some(
                        self.prompt
                            .prompt("Passphrase: ")
                            .map_err(Error::Passphrase)?,
                    )
                } else {
                    None
                };

                tracing::info!("Loading {}...", path.display());
                let persistable = Persistable::new(path, style).with_passphrase(passphrase);
                let application = persistable
                    .load(&self.plugins)
                    .and_then(|descriptor| {
                        Application::from_descriptor(&descriptor, &self.plugins).map_err(PersistError::from)
                    })
                    .map_err(load_failure)?;
                tracing::info!("Loaded.");

                Ok((application, Some(persistable)))
            }
        }
    }
}

fn load_failure(error: PersistError) -> Error {
    let mut message = format!("Failed to load application: {error}");
    if matches!(error, PersistError::MissingApplication) {
        message.push_str(
            "\n\nThe definition file must define an [application] table, \
             for example:\n\n[application]\nname = \"myapp\"\n",
        );
    }
    Error::LoadApplication(message)
}

/// Start the application's services on `reactor` and register its
/// shutdown triggers: stop the services before shutdown and, when
/// `persistable` is given, save the application after it.
pub fn start_application(
    reactor: &Reactor,
    application: Application,
    persistable: Option<Persistable>,
) -> Result<SharedApplication> {
    let shared = application.into_shared();

    let started = reactor.block_on(async { shared.lock().await.start_service().await });
    if let Err(e) = started {
        if let Err(stop) = reactor.block_on(async { shared.lock().await.stop_service().await }) {
            tracing::warn!(error = %stop, "Failed to stop services after a failed start");
        }
        return Err(e.into());
    }

    let app = Arc::clone(&shared);
    reactor.add_system_event_trigger(
        Phase::Before,
        SystemEvent::Shutdown,
        move || -> BoxFuture<'static, TriggerResult> { Box::pin(stop_services(app)) },
    );

    if let Some(store) = persistable {
        let app = Arc::clone(&shared);
        reactor.add_system_event_trigger(
            Phase::After,
            SystemEvent::Shutdown,
            move || -> BoxFuture<'static, TriggerResult> { Box::pin(save_application(app, store)) },
        );
    }

    Ok(shared)
}

async fn stop_services(app: SharedApplication) -> TriggerResult {
    app.lock().await.stop_service().await?;
    Ok(())
}

async fn save_application(app: SharedApplication, store: Persistable) -> TriggerResult {
    let descriptor = app.lock().await.descriptor();
    tokio::task::spawn_blocking(move || store.save(&descriptor)).await??;
    Ok(())
}

/// Block on the reactor (profiled, debugged or plain) and turn anything
/// that escapes into a crash report.
pub fn run_reactor_with_logging(
    options: &ServerOptions,
    application: &SharedApplication,
    reactor: &Reactor,
    profiler: &AppProfiler,
    run_id: Uuid,
) -> Result<()> {
    let outcome = catch_crash(|| -> Result<()> {
        if options.is_profiled() {
            profiler.run(reactor)?;
        } else if options.debug {
            let mut console = DebugConsole::stdio(Arc::clone(application));
            reactor.run_with(&mut console)?;
        } else {
            reactor.run()?;
        }
        Ok(())
    });

    let caught = match outcome {
        Ok(()) => return Ok(()),
        Err(Caught::Error(Error::Profiler(e @ ProfilerError::Unavailable { .. }))) => {
            return Err(Error::Profiler(e));
        }
        Err(caught) => caught,
    };

    let sink = CrashSink::choose(options.nodaemon, &options.crash_log);
    let report = CrashReport::from_caught(run_id, caught);
    tracing::error!(%run_id, error = %report.message, sink = %sink, "Reactor run crashed");
    if let Err(e) = sink.write(&report) {
        tracing::error!(sink = %sink, error = %e, "Failed to write crash report");
    }
    Err(Error::Crashed {
        sink: sink.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::Style;
    use crate::plugin::ServiceOptions;

    struct NoRun;

    impl RunnerHooks for NoRun {
        fn pre_application(&mut self, _options: &ServerOptions) -> Result<()> {
            Ok(())
        }

        fn post_application(&mut self, _run: PostApplication<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn runner(options: ServerOptions) -> ApplicationRunner<NoRun> {
        ApplicationRunner::new(
            options,
            Arc::new(PluginRegistry::builtin()),
            &ReactorRegistry::builtin(),
            NoRun,
        )
        .unwrap()
    }

    #[test]
    fn plugin_source_builds_single_child_container() {
        let options = ServerOptions {
            source: ApplicationSource::Plugin {
                tapname: "echo".to_string(),
                options: ServiceOptions::new().with("port", "0"),
            },
            ..ServerOptions::default()
        };

        let (app, persistable) = runner(options).create_or_get_application().unwrap();
        assert_eq!(app.name(), "echo");
        assert_eq!(app.service_names(), vec!["echo"]);
        assert!(persistable.is_none());
    }

    #[test]
    fn encrypted_file_asks_for_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.tap");
        Persistable::new(&path, Style::Binary)
            .with_passphrase(Some("pw".to_string()))
            .save(&Application::new("secret").descriptor())
            .unwrap();

        let options = ServerOptions {
            source: ApplicationSource::Persisted {
                path,
                style: Style::Binary,
            },
            encrypted: true,
            ..ServerOptions::default()
        };

        let (app, persistable) = runner(options)
            .with_passphrase_prompt(|message: &str| {
                assert_eq!(message, "Passphrase: ");
                Ok("pw".to_string())
            })
            .create_or_get_application()
            .unwrap();
        assert_eq!(app.name(), "secret");
        assert!(persistable.unwrap().is_encrypted());
    }

    #[test]
    fn missing_application_gets_explanation() {
        let generic = load_failure(PersistError::Decrypt).to_string();
        let missing = load_failure(PersistError::MissingApplication).to_string();

        assert!(generic.starts_with("Failed to load application: "));
        assert!(!generic.contains("[application]"));
        assert!(missing.contains("must define an [application] table"));
    }

    #[test]
    fn unsupported_profiler_fails_construction() {
        let options = ServerOptions {
            profiler: "bogus".to_string(),
            ..ServerOptions::default()
        };
        let err = ApplicationRunner::new(
            options,
            Arc::new(PluginRegistry::builtin()),
            &ReactorRegistry::builtin(),
            NoRun,
        )
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "Unsupported profiler name: bogus");
    }
}
