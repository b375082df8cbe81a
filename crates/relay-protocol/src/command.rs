//! Command parsing.
//!
//! Parsing never fails: a line that matches no keyword is a broadcast, and
//! a keyword with missing arguments degrades to empty arguments.

use relay_core::{truncate_to_boundary, MAX_NAME_LEN};

/// Keyword requesting the roster.
pub const LIST_KEYWORD: &str = "list";
/// Keyword requesting disconnection.
pub const DISCONNECT_KEYWORD: &str = "GONE";
/// Keyword introducing a private message.
pub const PRIVATE_KEYWORD: &str = "MESG";
/// Keyword introducing a rename.
pub const RENAME_KEYWORD: &str = "/CONN";

/// One client request, parsed from a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Deliver the full line to every other session.
    Broadcast(String),

    /// Reply to the sender with the list of connected names.
    ListRequest,

    /// Deliver `text` to the first session named `recipient`.
    ///
    /// `recipient` is empty when the client omitted it.
    PrivateMessage { recipient: String, text: String },

    /// Replace the sender's display name.
    ///
    /// `new_name` is empty when the client omitted it.
    Rename { new_name: String },

    /// Acknowledge and close the sender's connection.
    Disconnect,
}

impl Command {
    /// Parses one line (without its terminator) into a command.
    pub fn parse(line: &str) -> Self {
        let (keyword, rest) = split_token(line);

        match keyword {
            LIST_KEYWORD => Self::ListRequest,
            DISCONNECT_KEYWORD => Self::Disconnect,
            PRIVATE_KEYWORD => {
                let (recipient, text) = split_token(rest);
                Self::PrivateMessage {
                    recipient: truncate_to_boundary(recipient, MAX_NAME_LEN).to_string(),
                    text: text.to_string(),
                }
            }
            RENAME_KEYWORD => {
                let (new_name, _) = split_token(rest);
                Self::Rename {
                    new_name: truncate_to_boundary(new_name, MAX_NAME_LEN).to_string(),
                }
            }
            _ => Self::Broadcast(line.to_string()),
        }
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Broadcast(_) => "broadcast",
            Self::ListRequest => "list",
            Self::PrivateMessage { .. } => "private",
            Self::Rename { .. } => "rename",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Splits off the first whitespace-delimited token.
///
/// Returns the token and the remainder with its leading whitespace run
/// removed. Both are empty for a blank input.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim_start()),
        None => (s, ""),
    }
}
