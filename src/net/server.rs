//! A [`Service`] that serves TCP connections with a pluggable handler.
//!
//! # Data Flow
//! ```text
//! start_service
//!     → Listener::bind (connection limit)
//!     → accept loop task (until shutdown)
//!         → per connection: permit + guard, "connection" span
//!         → ConnectionHandler::handle
//! stop_service
//!     → shutdown.trigger() → accept loop exits → drain connections
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::Listener;
use crate::plugin::ServiceOptions;
use crate::service::{Service, ServiceDescriptor, ServiceError};

/// How long a stopping service waits for open connections to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves a single accepted connection.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<()>;
}

struct Running {
    shutdown: Shutdown,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// A TCP server that is started and stopped as a service.
pub struct TcpService<H> {
    name: String,
    maker: &'static str,
    options: ServiceOptions,
    bind_addr: SocketAddr,
    max_connections: usize,
    handler: Arc<H>,
    tracker: ConnectionTracker,
    running: Option<Running>,
}

impl<H: ConnectionHandler> TcpService<H> {
    /// `options` are kept verbatim for the service descriptor.
    pub fn new(
        maker: &'static str,
        options: ServiceOptions,
        bind_addr: SocketAddr,
        max_connections: usize,
        handler: H,
    ) -> Self {
        Self {
            name: maker.to_string(),
            maker,
            options,
            bind_addr,
            max_connections,
            handler: Arc::new(handler),
            tracker: ConnectionTracker::new(),
            running: None,
        }
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

impl<H> std::fmt::Debug for TcpService<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpService")
            .field("name", &self.name)
            .field("maker", &self.maker)
            .field("bind_addr", &self.bind_addr)
            .field("running", &self.running.is_some())
            .finish()
    }
}

#[async_trait]
impl<H: ConnectionHandler> Service for TcpService<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: self.name.clone(),
            maker: self.maker.to_string(),
            options: self.options.clone(),
        }
    }

    async fn start_service(&mut self) -> Result<(), ServiceError> {
        if self.running.is_some() {
            return Err(ServiceError::AlreadyRunning(self.name.clone()));
        }

        let listener = Listener::bind(self.bind_addr, self.max_connections)
            .await
            .map_err(|e| ServiceError::Start {
                name: self.name.clone(),
                source: Box::new(e),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServiceError::Start {
            name: self.name.clone(),
            source: Box::new(e),
        })?;

        let shutdown = Shutdown::new();
        let accept_task = tokio::spawn(accept_loop(
            self.name.clone(),
            listener,
            Arc::clone(&self.handler),
            self.tracker.clone(),
            shutdown.subscribe(),
        ));

        self.running = Some(Running {
            shutdown,
            accept_task,
            local_addr,
        });
        Ok(())
    }

    async fn stop_service(&mut self) -> Result<(), ServiceError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.shutdown.trigger();
        if let Err(e) = running.accept_task.await {
            return Err(ServiceError::Stop {
                name: self.name.clone(),
                message: format!("accept loop failed: {e}"),
            });
        }

        if !self.tracker.drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                service = %self.name,
                remaining = self.tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }
        Ok(())
    }
}

async fn accept_loop<H: ConnectionHandler>(
    service: String,
    listener: Listener,
    handler: Arc<H>,
    tracker: ConnectionTracker,
    mut shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = tracker.track();
                    let handler = Arc::clone(&handler);
                    let mut connection_shutdown = shutdown.clone();
                    let span = tracing::info_span!(
                        "connection",
                        service = %service,
                        connection_id = %guard.id(),
                        peer = %peer,
                    );

                    tokio::spawn(
                        async move {
                            let _permit = permit;
                            let _guard = guard;
                            tokio::select! {
                                result = handler.handle(stream, peer) => {
                                    if let Err(e) = result {
                                        tracing::debug!(error = %e, "Connection ended with error");
                                    }
                                }
                                _ = connection_shutdown.recv() => {
                                    tracing::debug!("Connection closed by shutdown");
                                }
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }
    tracing::debug!(service = %service, "Accept loop finished");
}
