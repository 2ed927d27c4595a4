//! The installed reactor: a Tokio runtime plus shutdown plumbing.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::lifecycle::{Shutdown, SignalListener};
use crate::reactor::registry::ReactorType;
use crate::reactor::triggers::{Phase, SystemEvent, TriggerId, TriggerResult, TriggerTable};
use crate::reactor::{InterruptHandler, Interruption, ReactorError, ShutdownOnSignal};

/// Lifecycle of a reactor. A reactor runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

/// The event loop every service runs on.
pub struct Reactor {
    reactor_type: ReactorType,
    runtime: Runtime,
    shutdown: Shutdown,
    triggers: Mutex<TriggerTable>,
    state: Mutex<RunState>,
}

impl Reactor {
    pub(crate) fn new(reactor_type: ReactorType) -> Result<Self, ReactorError> {
        let runtime = reactor_type
            .build_runtime()
            .map_err(ReactorError::Unusable)?;

        Ok(Self {
            reactor_type,
            runtime,
            shutdown: Shutdown::new(),
            triggers: Mutex::new(TriggerTable::new()),
            state: Mutex::new(RunState::Idle),
        })
    }

    pub fn short_name(&self) -> &'static str {
        self.reactor_type.short_name
    }

    pub fn reactor_type(&self) -> ReactorType {
        self.reactor_type
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// Drive a future to completion on this reactor outside of `run`.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Ask a running (or not yet started) reactor to shut down.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// A cloneable handle that can stop the reactor from anywhere.
    pub fn stopper(&self) -> ReactorStopper {
        ReactorStopper {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Register a callback for `(phase, event)`.
    pub fn add_system_event_trigger<F>(
        &self,
        phase: Phase,
        event: SystemEvent,
        trigger: F,
    ) -> TriggerId
    where
        F: FnOnce() -> BoxFuture<'static, TriggerResult> + Send + 'static,
    {
        lock(&self.triggers).add(phase, event, Box::new(trigger))
    }

    pub fn remove_system_event_trigger(&self, id: TriggerId) -> bool {
        lock(&self.triggers).remove(id)
    }

    /// Run until stopped, treating SIGINT/SIGTERM as a shutdown request.
    pub fn run(&self) -> Result<(), ReactorError> {
        self.run_with(&mut ShutdownOnSignal)
    }

    /// Run until stopped, routing signals through `interrupts`.
    ///
    /// Blocks the calling thread. Startup triggers fire first, shutdown
    /// triggers fire once the loop ends.
    pub fn run_with(&self, interrupts: &mut dyn InterruptHandler) -> Result<(), ReactorError> {
        {
            let mut state = lock(&self.state);
            if *state != RunState::Idle {
                return Err(ReactorError::AlreadyRan);
            }
            *state = RunState::Running;
        }

        let result = self.runtime.block_on(self.drive(interrupts));
        *lock(&self.state) = RunState::Stopped;
        result
    }

    async fn drive(&self, interrupts: &mut dyn InterruptHandler) -> Result<(), ReactorError> {
        self.fire(SystemEvent::Startup).await;

        let mut signals =
            SignalListener::new(interrupts.watches_user_signal()).map_err(ReactorError::Signals)?;
        let mut stop = self.shutdown.subscribe();

        tracing::info!(reactor = self.short_name(), "Reactor running");

        loop {
            tokio::select! {
                _ = stop.recv() => {
                    tracing::info!("Reactor stop requested");
                    break;
                }
                signal = signals.recv() => {
                    match interrupts.interrupted(signal, self.reactor_type).await {
                        Interruption::Resume => continue,
                        Interruption::Shutdown => {
                            tracing::info!(%signal, "Shutdown signal received");
                            break;
                        }
                    }
                }
            }
        }

        self.fire(SystemEvent::Shutdown).await;
        tracing::info!("Reactor stopped");
        Ok(())
    }

    async fn fire(&self, event: SystemEvent) {
        for phase in Phase::ORDER {
            let triggers = lock(&self.triggers).take(phase, event);
            for (id, trigger) in triggers {
                let span = tracing::info_span!("system_event", %phase, %event, trigger = %id);
                if let Err(e) = trigger().instrument(span).await {
                    tracing::error!(%phase, %event, trigger = %id, error = %e, "System event trigger failed");
                }
            }
        }
    }
}

impl fmt::Display for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.reactor_type.short_name, self.reactor_type.description
        )
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("reactor_type", &self.reactor_type)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Cloneable stop handle for a [`Reactor`].
#[derive(Debug, Clone)]
pub struct ReactorStopper {
    shutdown: Shutdown,
}

impl ReactorStopper {
    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::ReactorRegistry;
    use std::sync::Arc;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> impl FnOnce() -> BoxFuture<'static, TriggerResult> {
        let log = Arc::clone(log);
        let label = label.to_string();
        move || -> BoxFuture<'static, TriggerResult> {
            Box::pin(async move {
                log.lock().unwrap().push(label);
                TriggerResult::Ok(())
            })
        }
    }

    #[test]
    fn triggers_fire_in_phase_order() {
        let registry = ReactorRegistry::builtin();
        let reactor = registry.install("ct").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        reactor.add_system_event_trigger(Phase::After, SystemEvent::Shutdown, recorder(&log, "after"));
        reactor.add_system_event_trigger(Phase::Before, SystemEvent::Shutdown, recorder(&log, "before"));
        reactor.add_system_event_trigger(Phase::During, SystemEvent::Startup, recorder(&log, "startup"));

        // Stop as soon as the loop starts.
        let stopper = reactor.stopper();
        reactor.add_system_event_trigger(Phase::After, SystemEvent::Startup, move || -> BoxFuture<'static, TriggerResult> {
            Box::pin(async move {
                stopper.stop();
                TriggerResult::Ok(())
            })
        });

        reactor.run().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["startup", "before", "after"]);
        assert_eq!(reactor.state(), RunState::Stopped);
    }

    #[test]
    fn failing_trigger_does_not_block_the_rest() {
        let registry = ReactorRegistry::builtin();
        let reactor = registry.install("ct").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        reactor.add_system_event_trigger(Phase::Before, SystemEvent::Shutdown, || -> BoxFuture<'static, TriggerResult> {
            Box::pin(async {
                let result: TriggerResult = Err("boom".into());
                result
            })
        });
        reactor.add_system_event_trigger(Phase::Before, SystemEvent::Shutdown, recorder(&log, "second"));

        reactor.stop();
        reactor.run().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn reactor_is_not_restartable() {
        let registry = ReactorRegistry::builtin();
        let reactor = registry.install("mt").unwrap();

        reactor.stop();
        reactor.run().unwrap();
        assert!(matches!(reactor.run(), Err(ReactorError::AlreadyRan)));
    }

    #[test]
    fn display_names_the_reactor() {
        let registry = ReactorRegistry::builtin();
        let reactor = registry.install("ct").unwrap();
        assert!(reactor.to_string().starts_with("ct (Single-threaded"));
    }
}
