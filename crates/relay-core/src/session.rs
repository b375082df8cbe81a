//! Session domain entities and value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Maximum display name length in bytes.
pub const MAX_NAME_LEN: usize = 15;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a connected session.
///
/// Assigned by the registry at registration time from a monotonically
/// increasing counter, so ids are never reused within one process and
/// ordering by id is ordering by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a SessionId from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Display Name
// ============================================================================

/// Human-readable name a client goes by.
///
/// Names are trimmed, stripped of control characters and capped at
/// [`MAX_NAME_LEN`] bytes (on a char boundary). Uniqueness is not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    /// Normalizes raw client input into a display name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EmptyName` if nothing printable remains.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
        let trimmed = truncate_to_boundary(cleaned.trim(), MAX_NAME_LEN).trim_end();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyName);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Name given to a client that supplied nothing usable at handshake.
    pub fn guest(id: SessionId) -> Self {
        let name = format!("guest-{id}");
        Self(truncate_to_boundary(&name, MAX_NAME_LEN).to_string())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for DisplayName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DisplayName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Returns the longest prefix of `s` that fits in `max` bytes without
/// splitting a UTF-8 sequence.
pub fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.get(..end).unwrap_or_default()
}

// ============================================================================
// Session
// ============================================================================

/// Lifecycle state of a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered and accepting deliveries.
    #[default]
    Active,
    /// Handler has begun teardown; no new deliveries are routed to it.
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// Domain record for one connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub display_name: DisplayName,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    /// Creates an active session stamped with the current time.
    pub fn new(id: SessionId, display_name: DisplayName) -> Self {
        Self {
            id,
            display_name,
            state: SessionState::Active,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the session still accepts deliveries.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Key naming this session's log target, e.g. `20240101-120000-7`.
    pub fn log_key(&self) -> String {
        format!("{}-{}", self.created_at.format("%Y%m%d-%H%M%S"), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_ordering_follows_counter() {
        let first = SessionId::new(1);
        let second = first.next();
        assert!(first < second);
        assert_eq!(second.to_string(), "2");
    }

    #[test]
    fn test_display_name_trims_and_truncates() {
        let name = DisplayName::parse("  alice\r\n").unwrap();
        assert_eq!(name, "alice");

        let long = DisplayName::parse("abcdefghijklmnopqrstuvwxyz").unwrap();
        assert_eq!(long.as_str().len(), MAX_NAME_LEN);
        assert_eq!(long, "abcdefghijklmno");
    }

    #[test]
    fn test_display_name_rejects_empty() {
        assert_eq!(DisplayName::parse("   "), Err(DomainError::EmptyName));
        assert_eq!(DisplayName::parse("\n\r\t"), Err(DomainError::EmptyName));
    }

    #[test]
    fn test_display_name_respects_char_boundaries() {
        // 7 two-byte chars = 14 bytes, the eighth would cross 15
        let name = DisplayName::parse("ééééééééé").unwrap();
        assert_eq!(name.as_str().len(), 14);
        assert_eq!(name.as_str().chars().count(), 7);
    }

    #[test]
    fn test_guest_name() {
        assert_eq!(DisplayName::guest(SessionId::new(3)), "guest-3");
    }

    #[test]
    fn test_truncate_to_boundary() {
        assert_eq!(truncate_to_boundary("hello", 10), "hello");
        assert_eq!(truncate_to_boundary("hello", 3), "hel");
        assert_eq!(truncate_to_boundary("héllo", 2), "h");
        assert_eq!(truncate_to_boundary("", 0), "");
    }

    #[test]
    fn test_session_info_defaults() {
        let info = SessionInfo::new(SessionId::new(9), DisplayName::parse("bob").unwrap());
        assert!(info.is_active());
        assert_eq!(info.state.to_string(), "active");
        assert!(info.log_key().ends_with("-9"));
    }
}
