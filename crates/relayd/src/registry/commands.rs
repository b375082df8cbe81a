//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `SessionEvent`: Events published by the registry for subscribers
//! - `RegisteredSession`: The session record handed back to callers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use relay_core::{DisplayName, SessionId, SessionInfo};
use relay_protocol::ServerLine;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::outbound::{DeliveryError, Outbound};

// ============================================================================
// Session Record
// ============================================================================

/// A registered session: its domain record plus its outbound queue.
///
/// Cloned out of the registry for lookups and snapshots. The clone is a
/// point-in-time copy of the record; the outbound queue is shared.
#[derive(Debug, Clone)]
pub struct RegisteredSession {
    pub info: SessionInfo,
    pub outbound: Outbound,
}

impl RegisteredSession {
    /// Returns the session id.
    pub fn id(&self) -> SessionId {
        self.info.id
    }

    /// Returns the current display name.
    pub fn name(&self) -> &DisplayName {
        &self.info.display_name
    }

    /// Enqueues a line for this session's peer, waiting a bounded time
    /// for room in its queue.
    pub async fn deliver(&self, line: ServerLine) -> Result<(), DeliveryError> {
        self.outbound.deliver(line).await
    }
}

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a new session and assign it an id.
    ///
    /// A `None` name registers the session as `guest-{id}`. The welcome
    /// line is queued on `outbound` before the session becomes visible to
    /// any other caller.
    ///
    /// # Errors
    /// - `RegistryError::CapacityExceeded` if at maximum capacity
    Register {
        /// Display name from the handshake
        display_name: Option<DisplayName>,
        /// Queue the session's writer drains
        outbound: Outbound,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<RegisteredSession, RegistryError>>,
    },

    /// Remove a session. Absent ids are a no-op.
    Deregister {
        /// ID of the session to remove
        session_id: SessionId,
        /// Why the session is being removed
        reason: RemovalReason,
        /// Channel to send the removed record, if one was present
        respond_to: oneshot::Sender<Option<SessionInfo>>,
    },

    /// Flag a session as closing so it stops receiving deliveries.
    ///
    /// # Errors
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    MarkClosing {
        /// ID of the session
        session_id: SessionId,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Replace a session's display name.
    ///
    /// Responds with the previous name.
    ///
    /// # Errors
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    Rename {
        /// ID of the session to rename
        session_id: SessionId,
        /// Name to apply
        new_name: DisplayName,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<DisplayName, RegistryError>>,
    },

    /// Find the earliest-registered active session with this name.
    LookupByName {
        /// Display name to match exactly
        name: String,
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<RegisteredSession>>,
    },

    /// Snapshot every registered session in registration order.
    Enumerate {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<RegisteredSession>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry has reached its maximum session capacity.
    #[error("registry is full (max: {max} sessions)")]
    CapacityExceeded {
        /// Maximum number of sessions allowed
        max: usize,
    },

    /// The requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Session Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new session was registered.
    Registered {
        /// Record of the new session
        session: SessionInfo,
    },

    /// A session changed its display name.
    Renamed {
        /// ID of the renamed session
        session_id: SessionId,
        /// Name before the change
        old_name: DisplayName,
        /// Name after the change
        new_name: DisplayName,
    },

    /// A session was removed from the registry.
    Removed {
        /// Record of the removed session
        session: SessionInfo,
        /// Why the session was removed
        reason: RemovalReason,
    },
}

/// Reason why a session was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Peer closed the connection.
    PeerClosed,

    /// Reading from the peer failed.
    ReadError,

    /// Writing to the peer failed or timed out.
    WriteError,

    /// Client sent `GONE`.
    Requested,

    /// Server is shutting down.
    Shutdown,

    /// Handler task ended without completing its teardown.
    Abandoned,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed connection"),
            Self::ReadError => write!(f, "read error"),
            Self::WriteError => write!(f, "write error"),
            Self::Requested => write!(f, "client requested disconnect"),
            Self::Shutdown => write!(f, "server shutdown"),
            Self::Abandoned => write!(f, "handler abandoned session"),
        }
    }
}
