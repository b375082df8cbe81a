//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to session events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{broadcast, mpsc, oneshot};

use relay_core::{DisplayName, SessionId, SessionInfo};

use super::commands::{
    RegisteredSession, RegistryCommand, RegistryError, RemovalReason, SessionEvent,
};
use crate::outbound::Outbound;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// // Register a session
/// let session = handle.register(Some(name), outbound).await?;
///
/// // Snapshot the roster
/// let sessions = handle.enumerate().await;
///
/// // Watch arrivals and departures
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<SessionEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    /// * `event_sender` - The broadcast sender for subscribing to events
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Register a new session and receive its assigned id.
    ///
    /// # Errors
    ///
    /// - `RegistryError::CapacityExceeded` if the registry is at maximum capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        display_name: Option<DisplayName>,
        outbound: Outbound,
    ) -> Result<RegisteredSession, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                display_name,
                outbound,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove a session from the registry.
    ///
    /// Returns the removed record, or `None` if the session was already
    /// gone or the actor could not be reached. Calling this twice for the
    /// same id is harmless.
    pub async fn deregister(
        &self,
        session_id: SessionId,
        reason: RemovalReason,
    ) -> Option<SessionInfo> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Deregister {
                session_id,
                reason,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Flag a session as closing so broadcasts and lookups skip it.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn mark_closing(&self, session_id: SessionId) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::MarkClosing {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Replace a session's display name, returning the previous one.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the session doesn't exist
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn rename(
        &self,
        session_id: SessionId,
        new_name: DisplayName,
    ) -> Result<DisplayName, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Rename {
                session_id,
                new_name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Find the earliest-registered active session with this exact name.
    ///
    /// Returns `None` for an empty name, when nothing matches, or if
    /// communication with the actor fails.
    pub async fn lookup_by_name(&self, name: &str) -> Option<RegisteredSession> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::LookupByName {
                name: name.to_string(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Snapshot all sessions in registration order.
    ///
    /// Returns an empty vector if no sessions are registered or if
    /// communication with the actor fails.
    pub async fn enumerate(&self) -> Vec<RegisteredSession> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Enumerate { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Subscribe to session events.
    ///
    /// Returns a broadcast receiver that will receive all session events
    /// (registrations, renames, removals) published by the registry actor.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }
}
