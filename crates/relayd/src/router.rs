//! Message routing.
//!
//! The [`Router`] turns one parsed [`Command`] from one session into
//! deliveries on other sessions' outbound queues. It owns every
//! cross-session side effect; connection handlers never touch another
//! session directly.
//!
//! Delivery is bounded-effort: each peer's queue is offered the line for at
//! most the enqueue timeout. A peer whose queue stays full or has closed is
//! logged and skipped, never retried, and never fails the sender's session.
//! Fan-out visits peers one at a time, so lines from one sender reach each
//! peer's queue in the order they were routed.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Routing errors are returned to the caller, which logs them

use thiserror::Error;
use tracing::{debug, info};

use relay_core::{DisplayName, SessionId, SessionInfo};
use relay_protocol::{Command, ServerLine};

use crate::outbound::DeliveryError;
use crate::registry::{RegisteredSession, RegistryError, RegistryHandle};
use crate::session_log::SharedSessionLog;

// ============================================================================
// Types
// ============================================================================

/// What the connection handler should do after a command was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep reading commands.
    Continue,
    /// Begin teardown.
    Close,
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Lines accepted by a peer's queue.
    pub delivered: usize,
    /// Lines dropped because the peer's queue stayed full or was closed.
    pub failed: usize,
}

/// Errors local to routing one command.
///
/// None of these affect any session other than the sender.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Private message target is not registered.
    #[error("recipient not found: {0:?}")]
    RecipientNotFound(String),

    /// A line for a peer could not be enqueued.
    #[error("delivery to session {session_id} failed: {reason}")]
    DeliveryFailed {
        /// Session the line was meant for
        session_id: SessionId,
        /// Why the queue refused it
        reason: DeliveryError,
    },

    /// The registry rejected or could not answer a request.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ============================================================================
// Router
// ============================================================================

/// Routes commands between sessions.
///
/// Cheap to clone; every connection handler holds its own copy.
#[derive(Clone)]
pub struct Router {
    registry: RegistryHandle,
    session_log: SharedSessionLog,
}

impl Router {
    /// Creates a router over a registry and session log sink.
    pub fn new(registry: RegistryHandle, session_log: SharedSessionLog) -> Self {
        Self {
            registry,
            session_log,
        }
    }

    /// Routes one command from `sender`.
    ///
    /// A successful rename updates `sender` in place so later commands
    /// use the new name.
    ///
    /// # Errors
    ///
    /// - `RouteError::RecipientNotFound` if a private message target is absent
    ///   (the sender has already been told)
    /// - `RouteError::DeliveryFailed` if a reply to the sender could not be queued
    /// - `RouteError::Registry` if a rename could not be applied
    pub async fn route(
        &self,
        sender: &mut RegisteredSession,
        command: Command,
    ) -> Result<Disposition, RouteError> {
        match command {
            Command::Broadcast(text) => {
                let line = ServerLine::chat(sender.name().as_str(), text);
                let report = self.announce(sender.id(), line).await;
                debug!(
                    session_id = %sender.id(),
                    delivered = report.delivered,
                    failed = report.failed,
                    "Broadcast routed"
                );
                Ok(Disposition::Continue)
            }
            Command::ListRequest => {
                let roster = self.registry.enumerate().await;
                let line = ServerLine::roster(roster.iter().map(|s| s.name().to_string()));
                reply(sender, line).await?;
                Ok(Disposition::Continue)
            }
            Command::PrivateMessage { recipient, text } => {
                self.route_private(sender, recipient, text).await?;
                Ok(Disposition::Continue)
            }
            Command::Rename { new_name } => {
                self.route_rename(sender, &new_name).await?;
                Ok(Disposition::Continue)
            }
            Command::Disconnect => {
                // Teardown goes ahead even if the acknowledgment is dropped
                if let Err(e) = reply(sender, ServerLine::Disconnected).await {
                    debug!(session_id = %sender.id(), error = %e, "Disconnect ack not queued");
                }
                Ok(Disposition::Close)
            }
        }
    }

    /// Delivers `line` to every active session except `except`.
    ///
    /// Uses one registry snapshot; sessions that join after it are not
    /// included and sessions that have left are skipped.
    pub async fn announce(&self, except: SessionId, line: ServerLine) -> DeliveryReport {
        self.fan_out(line, |peer| peer.id != except).await
    }

    /// Tells every active session registered before `arrival` that it joined.
    pub async fn announce_arrival(&self, arrival: &SessionInfo) -> DeliveryReport {
        let line = ServerLine::joined(arrival.display_name.as_str());
        self.fan_out(line, |peer| peer.id < arrival.id).await
    }

    async fn fan_out<F>(&self, line: ServerLine, include: F) -> DeliveryReport
    where
        F: Fn(&SessionInfo) -> bool,
    {
        let mut report = DeliveryReport::default();

        for peer in self.registry.enumerate().await {
            if !peer.info.is_active() || !include(&peer.info) {
                continue;
            }
            match peer.deliver(line.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(
                        session_id = %peer.id(),
                        error = %e,
                        "Skipping peer during fan-out"
                    );
                }
            }
        }

        report
    }

    async fn route_private(
        &self,
        sender: &RegisteredSession,
        recipient: String,
        text: String,
    ) -> Result<(), RouteError> {
        let Some(target) = self.registry.lookup_by_name(&recipient).await else {
            let line = ServerLine::recipient_not_found(recipient.as_str());
            self.session_log.append(&sender.info, &line.to_string());
            reply(sender, line).await?;
            return Err(RouteError::RecipientNotFound(recipient));
        };

        // Best-effort: a failed enqueue still counts as delivered
        if let Err(e) = target
            .deliver(ServerLine::private(sender.name().as_str(), text))
            .await
        {
            debug!(
                from = %sender.id(),
                to = %target.id(),
                error = %e,
                "Private message dropped"
            );
        }
        Ok(())
    }

    async fn route_rename(
        &self,
        sender: &mut RegisteredSession,
        new_name: &str,
    ) -> Result<(), RouteError> {
        let Ok(name) = DisplayName::parse(new_name) else {
            reply(sender, ServerLine::RenameRejected).await?;
            return Ok(());
        };

        let old_name = self.registry.rename(sender.id(), name.clone()).await?;
        sender.info.display_name = name;

        info!(
            session_id = %sender.id(),
            old_name = %old_name,
            new_name = %sender.name(),
            "Client renamed"
        );

        reply(sender, ServerLine::renamed(sender.name().as_str())).await
    }
}

/// Queues a line for the sender itself.
async fn reply(sender: &RegisteredSession, line: ServerLine) -> Result<(), RouteError> {
    sender
        .deliver(line)
        .await
        .map_err(|reason| RouteError::DeliveryFailed {
            session_id: sender.id(),
            reason,
        })
}
