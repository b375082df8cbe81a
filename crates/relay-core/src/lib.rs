//! Relay Core - Shared types for the chat relay
//!
//! This crate provides the domain types shared between the wire
//! protocol (relay-protocol) and the daemon (relayd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod diagnostics;
pub mod error;
pub mod session;

// Re-exports for convenience
pub use diagnostics::{classify, Diagnostics, Parity};
pub use error::{DomainError, DomainResult};
pub use session::{
    truncate_to_boundary, DisplayName, SessionId, SessionInfo, SessionState, MAX_NAME_LEN,
};
