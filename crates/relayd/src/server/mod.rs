//! TCP server for the chat relay.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Turns registry events into arrival and departure notices
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │     Router      │
//! └─────────────────┘     └────────┬────────┘
//!                                  │ SessionEvent
//!                                  ▼
//!                         ┌─────────────────┐
//!                         │Presence notifier│
//!                         └─────────────────┘
//! ```
//!
//! The accept loop never touches session state; it only produces handlers.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, ConnectionState, RelayContext};

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relay_core::SessionInfo;
use relay_protocol::ServerLine;

use crate::registry::SessionEvent;
use crate::router::Router;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 9000;

/// Bound on waiting for handlers to finish after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// TCP server for the chat relay.
pub struct RelayServer {
    /// Bound listener
    listener: TcpListener,

    /// Shared handler state
    context: RelayContext,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log labels
    connection_counter: AtomicU64,
}

impl RelayServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        addr: &str,
        context: RelayContext,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            context,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits (bounded) for every handler to deregister its session.
    pub async fn run(self) -> Result<(), ServerError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(addr = %addr, "Relay server listening");
        }

        let notifier = spawn_presence_notifier(
            self.context.router.clone(),
            self.context.registry.subscribe(),
            self.cancel_token.clone(),
        );
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                // Check for cancellation
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                // Reap finished handlers
                Some(_) = handlers.join_next(), if !handlers.is_empty() => {}

                // Accept new connection
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(&mut handlers, stream, addr, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        drop(self.listener);
        drain_handlers(handlers).await;
        notifier.abort();
        info!("Server stopped");
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(
        &self,
        handlers: &mut JoinSet<Option<SessionInfo>>,
        stream: TcpStream,
        addr: SocketAddr,
        connection_number: u64,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
        }
        debug!(peer = %addr, connection = connection_number, "Accepted connection");

        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            self.context.clone(),
            self.cancel_token.child_token(),
            addr.to_string(),
        );
        handlers.spawn(handler.run());
    }
}

/// Waits for handlers to observe cancellation and tear down.
async fn drain_handlers(mut handlers: JoinSet<Option<SessionInfo>>) {
    if handlers.is_empty() {
        return;
    }
    debug!(remaining = handlers.len(), "Waiting for connection handlers");

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = handlers.len(),
            "Connection handlers did not finish in time, aborting"
        );
        handlers.abort_all();
    }
}

/// Spawns the task turning registry events into presence notices.
///
/// A registration becomes `New client connected: {name}` for every session
/// registered before it; a removal becomes `Client {name} disconnected` for
/// everyone still active.
pub fn spawn_presence_notifier(
    router: Router,
    mut event_rx: broadcast::Receiver<SessionEvent>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Presence notifier shutting down");
                    break;
                }

                result = event_rx.recv() => {
                    match result {
                        Ok(event) => announce_event(&router, event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Presence notifier lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Event channel closed");
                            break;
                        }
                    }
                }
            }
        }
    })
}

async fn announce_event(router: &Router, event: SessionEvent) {
    let report = match event {
        SessionEvent::Registered { session } => router.announce_arrival(&session).await,
        SessionEvent::Removed { session, .. } => {
            let line = ServerLine::left(session.display_name.as_str());
            router.announce(session.id, line).await
        }
        SessionEvent::Renamed { .. } => return,
    };

    debug!(
        delivered = report.delivered,
        failed = report.failed,
        "Presence notice sent"
    );
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}
