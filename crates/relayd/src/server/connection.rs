//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Reads the display name and registers the session
//! - Reads lines, logs their diagnostics, parses and routes them
//! - Deregisters the session exactly once, whatever ended the connection
//!
//! # Lifecycle
//!
//! ```text
//! Handshaking ──register──▶ Active ──EOF / error / GONE / shutdown──▶ Closing ──deregister──▶ Closed
//!      │                                                                                      ▲
//!      └──────────── EOF / timeout / registry full ───────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::future;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{classify, DisplayName, SessionId, SessionInfo, MAX_NAME_LEN};
use relay_protocol::{Command, LineCodec, ServerLine};

use crate::config::SessionSettings;
use crate::outbound::{spawn_writer, Outbound};
use crate::registry::{RegisteredSession, RegistryError, RegistryHandle, RemovalReason};
use crate::router::{Disposition, Router};
use crate::session_log::SharedSessionLog;

// ============================================================================
// Shared Context
// ============================================================================

/// Everything a handler shares with the rest of the server.
#[derive(Clone)]
pub struct RelayContext {
    /// Handle to the session registry
    pub registry: RegistryHandle,
    /// Command router
    pub router: Router,
    /// Per-session log sink
    pub session_log: SharedSessionLog,
    /// Timeouts and queue depth
    pub settings: SessionSettings,
}

impl RelayContext {
    /// Builds a context, wiring a router over the same registry and sink.
    pub fn new(
        registry: RegistryHandle,
        session_log: SharedSessionLog,
        settings: SessionSettings,
    ) -> Self {
        let router = Router::new(registry.clone(), session_log.clone());
        Self {
            registry,
            router,
            session_log,
            settings,
        }
    }
}

// ============================================================================
// Connection Handler
// ============================================================================

/// Handler lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the display name.
    Handshaking,
    /// Registered and processing commands.
    Active,
    /// Tearing down.
    Closing,
    /// Finished; no further operations.
    Closed,
}

/// Connection handler for a single client.
///
/// Generic over the transport halves so it can run on a TCP socket or an
/// in-memory pipe.
pub struct ConnectionHandler<R, W> {
    /// Framed line reader
    reader: FramedRead<R, LineCodec>,

    /// Write half, moved into the writer task when the handler starts
    writer: Option<W>,

    /// Shared server state
    context: RelayContext,

    /// Cancelled on server shutdown
    cancel: CancellationToken,

    /// Peer label for logs
    peer: String,

    /// Current lifecycle state
    state: ConnectionState,
}

impl<R, W> ConnectionHandler<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the connection
    /// * `writer` - Write half of the connection
    /// * `context` - Registry, router, log sink and settings
    /// * `cancel` - Token cancelled on server shutdown
    /// * `peer` - Label used in log fields
    pub fn new(
        reader: R,
        writer: W,
        context: RelayContext,
        cancel: CancellationToken,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            reader: FramedRead::new(reader, LineCodec::new().with_handshake(MAX_NAME_LEN)),
            writer: Some(writer),
            context,
            cancel,
            peer: peer.into(),
            state: ConnectionState::Handshaking,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the connection handler.
    ///
    /// Returns the final session record, or `None` if the client never
    /// got past the handshake.
    pub async fn run(mut self) -> Option<SessionInfo> {
        let writer = self.writer.take()?;
        let settings = self.context.settings;
        let (outbound, rx) = Outbound::channel(settings.outbound_queue);
        let outbound = outbound.with_enqueue_timeout(settings.write_timeout);
        let writer_task = spawn_writer(
            writer,
            rx,
            settings.write_timeout,
            self.peer.clone(),
        );

        let result = match self.handshake(outbound.clone()).await {
            Ok(session) => Some(self.serve(session).await),
            Err(ConnectionError::CapacityExceeded { max }) => {
                warn!(peer = %self.peer, max, "Rejecting client, server is full");
                let _ = outbound.deliver(ServerLine::ServerFull { max }).await;
                None
            }
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "Handshake did not complete");
                None
            }
        };

        drop(outbound);
        self.finish_writer(writer_task).await;
        self.state = ConnectionState::Closed;
        result
    }

    /// Reads the display name and registers the session.
    ///
    /// The name is whatever the first read delivers, up to the name limit;
    /// the client need not terminate it. The registry queues the welcome.
    async fn handshake(&mut self, outbound: Outbound) -> Result<RegisteredSession, ConnectionError> {
        let line = timeout(self.context.settings.handshake_timeout, self.next_line(None))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout)??;

        // Blank names fall back to guest-{id}
        let name = DisplayName::parse(&line).ok();

        self.context
            .registry
            .register(name, outbound)
            .await
            .map_err(|e| match e {
                RegistryError::CapacityExceeded { max } => ConnectionError::CapacityExceeded { max },
                other => ConnectionError::Registry(other),
            })
    }

    /// Serves a registered session until it ends, then tears it down.
    async fn serve(&mut self, mut session: RegisteredSession) -> SessionInfo {
        self.state = ConnectionState::Active;
        let guard = RegistrationGuard::new(self.context.registry.clone(), session.id());

        info!(
            session_id = %session.id(),
            name = %session.name(),
            peer = %self.peer,
            "Client connected"
        );
        self.context.session_log.append(&session.info, "connected");

        let reason = self.process_lines(&mut session).await;

        self.state = ConnectionState::Closing;
        if let Err(e) = self.context.registry.mark_closing(session.id()).await {
            debug!(session_id = %session.id(), error = %e, "Could not mark session closing");
        }
        self.context.session_log.append(&session.info, "disconnected");
        guard.release(reason).await;
        self.context.session_log.close(&session.info);

        info!(
            session_id = %session.id(),
            name = %session.name(),
            reason = %reason,
            "Client disconnected"
        );
        session.info
    }

    /// Reads and dispatches lines until the session should end.
    async fn process_lines(&mut self, session: &mut RegisteredSession) -> RemovalReason {
        loop {
            let line = match self.next_line(Some(&session.outbound)).await {
                Ok(line) => line,
                Err(ConnectionError::Eof) => return RemovalReason::PeerClosed,
                Err(ConnectionError::Shutdown) => return RemovalReason::Shutdown,
                Err(ConnectionError::WriterClosed) => return RemovalReason::WriteError,
                Err(e) => {
                    debug!(session_id = %session.id(), error = %e, "Read failed");
                    return RemovalReason::ReadError;
                }
            };

            let diagnostics = classify(line.as_bytes());
            debug!(
                session_id = %session.id(),
                len = line.len(),
                parity = %diagnostics.parity,
                ones = diagnostics.ones,
                checksum = diagnostics.checksum,
                "Received line"
            );
            self.context.session_log.append(&session.info, &line);

            let command = Command::parse(&line);
            let kind = command.kind();
            match self.context.router.route(session, command).await {
                Ok(Disposition::Continue) => {}
                Ok(Disposition::Close) => return RemovalReason::Requested,
                Err(e) => {
                    debug!(
                        session_id = %session.id(),
                        command = kind,
                        error = %e,
                        "Command not completed"
                    );
                }
            }
        }
    }

    /// Reads one line, giving up on shutdown or when the writer stops.
    async fn next_line(&mut self, outbound: Option<&Outbound>) -> Result<String, ConnectionError> {
        let writer_stopped = async {
            match outbound {
                Some(outbound) => outbound.closed().await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(ConnectionError::Shutdown),
            _ = writer_stopped => Err(ConnectionError::WriterClosed),
            item = self.reader.next() => match item {
                Some(Ok(line)) => Ok(line),
                Some(Err(e)) => Err(ConnectionError::Io(e.to_string())),
                None => Err(ConnectionError::Eof),
            },
        }
    }

    /// Waits for queued lines to reach the peer, then drops the writer.
    async fn finish_writer(&self, mut task: JoinHandle<()>) {
        if timeout(self.context.settings.flush_timeout, &mut task)
            .await
            .is_err()
        {
            debug!(peer = %self.peer, "Outbound flush timed out, aborting writer");
            task.abort();
        }
    }
}

// ============================================================================
// Registration Guard
// ============================================================================

/// Deregisters a session if the handler is dropped before its teardown.
///
/// The normal path calls [`RegistrationGuard::release`]. If the handler's
/// task is aborted instead, `Drop` spawns the deregistration; the registry
/// ignores a second removal of the same id.
struct RegistrationGuard {
    registry: RegistryHandle,
    session_id: SessionId,
    armed: bool,
}

impl RegistrationGuard {
    fn new(registry: RegistryHandle, session_id: SessionId) -> Self {
        Self {
            registry,
            session_id,
            armed: true,
        }
    }

    async fn release(mut self, reason: RemovalReason) -> Option<SessionInfo> {
        let removed = self.registry.deregister(self.session_id, reason).await;
        self.armed = false;
        removed
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let registry = self.registry.clone();
        let session_id = self.session_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    registry
                        .deregister(session_id, RemovalReason::Abandoned)
                        .await;
                });
            }
            Err(_) => {
                warn!(session_id = %session_id, "No runtime to deregister abandoned session");
            }
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Handshake timeout")]
    HandshakeTimeout,

    #[error("Server is full (max: {max} sessions)")]
    CapacityExceeded { max: usize },

    #[error("Registry error: {0}")]
    Registry(RegistryError),

    #[error("Server shutting down")]
    Shutdown,

    #[error("Writer stopped")]
    WriterClosed,
}
