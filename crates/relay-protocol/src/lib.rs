//! Relay Protocol - Line-based wire protocol for the chat relay
//!
//! Clients speak plain text, one command per line:
//!
//! | Line                 | Effect                               |
//! |----------------------|--------------------------------------|
//! | `list`               | sender receives the roster           |
//! | `GONE`               | sender is disconnected after an ack  |
//! | `MESG <name> <text>` | private delivery to `<name>`         |
//! | `/CONN <name>`       | rename the sender's session          |
//! | anything else        | broadcast to every other session     |
//!
//! This crate provides the [`Command`] parser, the [`LineCodec`] framing
//! incoming bytes into lines, and the [`ServerLine`] replies the daemon
//! writes back.

pub mod codec;
pub mod command;
pub mod reply;

pub use codec::LineCodec;
pub use command::Command;
pub use reply::ServerLine;

pub use relay_core::MAX_NAME_LEN;

/// Maximum payload bytes in one line, excluding the terminator.
pub const MAX_LINE_LEN: usize = 254;
