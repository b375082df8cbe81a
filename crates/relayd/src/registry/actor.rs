//! Registry actor - owns all session state and processes commands.
//!
//! The RegistryActor is the single owner of session state in the system.
//! It receives commands via an mpsc channel and publishes events via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::BTreeMap;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use relay_core::{DisplayName, SessionId, SessionInfo, SessionState};
use relay_protocol::ServerLine;

use super::commands::{
    RegisteredSession, RegistryCommand, RegistryError, RemovalReason, SessionEvent,
};
use crate::outbound::Outbound;

/// Default maximum number of sessions the registry can hold.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all session state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
///
/// # Ordering
///
/// Sessions are keyed by [`SessionId`], which the actor assigns from a
/// monotonically increasing counter. Iterating the map therefore yields
/// sessions in registration order, which gives both the roster order and
/// the earliest-registered tie-break for name lookups.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// Every command observes the effects of every command processed before it,
/// so snapshots are consistent with one serialization of all callers.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Session storage in registration order
    sessions: BTreeMap<SessionId, RegisteredSession>,

    /// Id handed to the next registration
    next_id: SessionId,

    /// Capacity limit
    max_sessions: usize,

    /// Event publisher for presence notices
    event_publisher: broadcast::Sender<SessionEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    /// * `max_sessions` - Capacity limit (a value of 0 is treated as 1)
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<SessionEvent>,
        max_sessions: usize,
    ) -> Self {
        Self {
            receiver,
            sessions: BTreeMap::new(),
            next_id: SessionId::new(1),
            max_sessions: max_sessions.max(1),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!(max_sessions = self.max_sessions, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            "Registry actor stopped (sessions: {})",
            self.sessions.len()
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                display_name,
                outbound,
                respond_to,
            } => {
                let result = self.handle_register(display_name, outbound);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Deregister {
                session_id,
                reason,
                respond_to,
            } => {
                let result = self.handle_deregister(session_id, reason);
                let _ = respond_to.send(result);
            }
            RegistryCommand::MarkClosing {
                session_id,
                respond_to,
            } => {
                let result = self.handle_mark_closing(session_id);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Rename {
                session_id,
                new_name,
                respond_to,
            } => {
                let result = self.handle_rename(session_id, new_name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::LookupByName { name, respond_to } => {
                let result = self.handle_lookup_by_name(&name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Enumerate { respond_to } => {
                let result = self.sessions.values().cloned().collect();
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles session registration.
    fn handle_register(
        &mut self,
        display_name: Option<DisplayName>,
        outbound: Outbound,
    ) -> Result<RegisteredSession, RegistryError> {
        if self.sessions.len() >= self.max_sessions {
            warn!(
                current = self.sessions.len(),
                max = self.max_sessions,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::CapacityExceeded {
                max: self.max_sessions,
            });
        }

        let session_id = self.next_id;
        self.next_id = session_id.next();

        let display_name = display_name.unwrap_or_else(|| DisplayName::guest(session_id));
        let session = RegisteredSession {
            info: SessionInfo::new(session_id, display_name),
            outbound,
        };

        // The queue is fresh, so the welcome always fits and lands ahead of
        // anything another session can route here after the insert.
        let welcome = ServerLine::welcome(session.info.display_name.as_str());
        if let Err(e) = session.outbound.try_deliver(welcome) {
            debug!(session_id = %session_id, error = %e, "Welcome not queued");
        }
        self.sessions.insert(session_id, session.clone());

        info!(
            session_id = %session_id,
            name = %session.info.display_name,
            total_sessions = self.sessions.len(),
            "Session registered"
        );

        // Publish event (ignore if no subscribers)
        let _ = self.event_publisher.send(SessionEvent::Registered {
            session: session.info.clone(),
        });

        Ok(session)
    }

    /// Handles session removal. Idempotent.
    fn handle_deregister(
        &mut self,
        session_id: SessionId,
        reason: RemovalReason,
    ) -> Option<SessionInfo> {
        let Some(removed) = self.sessions.remove(&session_id) else {
            debug!(
                session_id = %session_id,
                reason = %reason,
                "Deregister for absent session, ignoring"
            );
            return None;
        };

        info!(
            session_id = %session_id,
            name = %removed.info.display_name,
            reason = %reason,
            remaining_sessions = self.sessions.len(),
            "Session removed"
        );

        let _ = self.event_publisher.send(SessionEvent::Removed {
            session: removed.info.clone(),
            reason,
        });

        Some(removed.info)
    }

    /// Handles flagging a session as closing.
    fn handle_mark_closing(&mut self, session_id: SessionId) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(RegistryError::SessionNotFound(session_id))?;

        session.info.state = SessionState::Closing;
        debug!(session_id = %session_id, "Session closing");
        Ok(())
    }

    /// Handles renaming a session in place.
    fn handle_rename(
        &mut self,
        session_id: SessionId,
        new_name: DisplayName,
    ) -> Result<DisplayName, RegistryError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(RegistryError::SessionNotFound(session_id))?;

        let old_name = std::mem::replace(&mut session.info.display_name, new_name.clone());

        info!(
            session_id = %session_id,
            old_name = %old_name,
            new_name = %new_name,
            "Session renamed"
        );

        let _ = self.event_publisher.send(SessionEvent::Renamed {
            session_id,
            old_name: old_name.clone(),
            new_name,
        });

        Ok(old_name)
    }

    /// Handles name lookup: first active match in registration order.
    fn handle_lookup_by_name(&self, name: &str) -> Option<RegisteredSession> {
        if name.is_empty() {
            return None;
        }
        self.sessions
            .values()
            .find(|s| s.info.is_active() && s.info.display_name == *name)
            .cloned()
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of sessions currently registered.
    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
