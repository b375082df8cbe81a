//! Lines the server writes to clients.

use std::fmt;

/// Header of the roster reply.
pub const ROSTER_HEADER: &str = "Connected Clients";

/// A single server-to-client line.
///
/// `Display` renders the wire text without the terminator; use
/// [`ServerLine::to_wire`] for the framed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Greeting sent to a newly registered client.
    Welcome { name: String },

    /// Another client joined.
    Joined { name: String },

    /// Another client left.
    Left { name: String },

    /// Broadcast chat from another client.
    Chat { from: String, text: String },

    /// Private message addressed to this client.
    Private { from: String, text: String },

    /// Reply to `list`: header followed by one name per line.
    Roster { names: Vec<String> },

    /// Private message target does not exist.
    RecipientNotFound { name: String },

    /// Rename acknowledgment.
    Renamed { name: String },

    /// `/CONN` without a usable name.
    RenameRejected,

    /// Acknowledgment of `GONE`.
    Disconnected,

    /// Registration refused because the registry is at capacity.
    ServerFull { max: usize },
}

impl ServerLine {
    /// Creates a welcome line.
    pub fn welcome(name: impl Into<String>) -> Self {
        Self::Welcome { name: name.into() }
    }

    /// Creates an arrival notice.
    pub fn joined(name: impl Into<String>) -> Self {
        Self::Joined { name: name.into() }
    }

    /// Creates a departure notice.
    pub fn left(name: impl Into<String>) -> Self {
        Self::Left { name: name.into() }
    }

    /// Creates a broadcast chat line.
    pub fn chat(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Chat {
            from: from.into(),
            text: text.into(),
        }
    }

    /// Creates a private message line.
    pub fn private(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Private {
            from: from.into(),
            text: text.into(),
        }
    }

    /// Creates a roster reply.
    pub fn roster<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Roster {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a recipient-not-found error line.
    pub fn recipient_not_found(name: impl Into<String>) -> Self {
        Self::RecipientNotFound { name: name.into() }
    }

    /// Creates a rename acknowledgment.
    pub fn renamed(name: impl Into<String>) -> Self {
        Self::Renamed { name: name.into() }
    }

    /// Returns the wire form: the rendered text followed by `\n`.
    pub fn to_wire(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome { name } => write!(f, "Welcome to the server, {name}!"),
            Self::Joined { name } => write!(f, "New client connected: {name}"),
            Self::Left { name } => write!(f, "Client {name} disconnected"),
            Self::Chat { from, text } => write!(f, "{from}: {text}"),
            Self::Private { from, text } => write!(f, "[Private]{from}: {text}"),
            Self::Roster { names } => {
                f.write_str(ROSTER_HEADER)?;
                for name in names {
                    write!(f, "\n{name}")?;
                }
                Ok(())
            }
            Self::RecipientNotFound { name } => write!(f, "Recipient not found: {name}"),
            Self::Renamed { name } => {
                write!(f, "You have been connected with a new username: {name}")
            }
            Self::RenameRejected => write!(f, "Usage: /CONN <name>"),
            Self::Disconnected => write!(f, "You are disconnected"),
            Self::ServerFull { max } => write!(f, "Server is full (max {max} clients)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_lines() {
        assert_eq!(ServerLine::chat("alice", "hi").to_string(), "alice: hi");
        assert_eq!(
            ServerLine::private("alice", "psst").to_string(),
            "[Private]alice: psst"
        );
    }

    #[test]
    fn test_roster_layout() {
        let line = ServerLine::roster(["alice", "bob"]);
        assert_eq!(line.to_string(), "Connected Clients\nalice\nbob");
        assert_eq!(line.to_wire(), "Connected Clients\nalice\nbob\n");

        let empty = ServerLine::roster(Vec::<String>::new());
        assert_eq!(empty.to_string(), ROSTER_HEADER);
    }

    #[test]
    fn test_lifecycle_lines() {
        assert_eq!(
            ServerLine::welcome("bob").to_string(),
            "Welcome to the server, bob!"
        );
        assert_eq!(
            ServerLine::joined("bob").to_string(),
            "New client connected: bob"
        );
        assert_eq!(ServerLine::left("bob").to_string(), "Client bob disconnected");
        assert_eq!(ServerLine::Disconnected.to_wire(), "You are disconnected\n");
        assert_eq!(
            ServerLine::ServerFull { max: 10 }.to_string(),
            "Server is full (max 10 clients)"
        );
    }

    #[test]
    fn test_error_lines() {
        assert_eq!(
            ServerLine::recipient_not_found("bob").to_string(),
            "Recipient not found: bob"
        );
        assert_eq!(ServerLine::RenameRejected.to_string(), "Usage: /CONN <name>");
        assert_eq!(
            ServerLine::renamed("carol").to_string(),
            "You have been connected with a new username: carol"
        );
    }
}
