//! Session registry using Actor pattern.
//!
//! The registry is the single source of truth for who is connected. It
//! receives commands via a tokio mpsc channel, answers each over a oneshot,
//! and announces membership changes on a broadcast channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ConnectionHandler │────▶│  RegistryActor  │────▶│Broadcast Channel │
//! │     Router       │     └─────────────────┘     └──────────────────┘
//! └──────────────────┘             │                        │
//!         │   RegistryCommand      │   SessionEvent         │
//!         │   (mpsc channel)       │   (broadcast)          │
//!         ▼                        ▼                        ▼
//!   Register/Lookup/        BTreeMap<SessionId,      Presence notifier
//!   Enumerate/Deregister    RegisteredSession>       (join/leave notices)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, DEFAULT_MAX_SESSIONS};
pub use commands::{
    RegisteredSession, RegistryCommand, RegistryError, RemovalReason, SessionEvent,
};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates command and event channels
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Returns a RegistryHandle for client use
///
/// The actor stops once every handle clone has been dropped.
///
/// # Example
///
/// ```no_run
/// use relayd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(10);
///
///     let sessions = handle.enumerate().await;
///     assert!(sessions.is_empty());
/// }
/// ```
pub fn spawn_registry(max_sessions: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), max_sessions);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
