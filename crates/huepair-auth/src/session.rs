//! Pairing sessions and their lifecycle states

use crate::challenge::Challenge;
use chrono::{DateTime, Utc};
use huepair_core::Sequence;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a live client connection, assigned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, waiting for a scanner
    Open,
    /// Scanner attached, waiting for the final handshake
    Joined,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// Final handshake verified
    Paired,
    /// Initiator went away or the session idled out
    Abandoned,
}

/// A live pairing session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    /// Connection that asked for the session and displays the sequence
    pub initiator: ConnectionId,
    /// Connection that scanned the sequence, once joined
    pub scanner: Option<ConnectionId>,
    /// Immutable for the session's lifetime
    pub sequence: Sequence,
    /// Most recently issued challenge
    pub challenge: Challenge,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        initiator: ConnectionId,
        sequence: Sequence,
        challenge: Challenge,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            initiator,
            scanner: None,
            sequence,
            challenge,
            state: SessionState::Open,
            created_at: now,
            last_activity: now,
        }
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Whether nothing has happened on this session for at least `timeout_secs`
    pub fn is_idle(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        let timeout = i64::try_from(timeout_secs).unwrap_or(i64::MAX);
        (now - self.last_activity).num_seconds() >= timeout
    }

    /// Whether `connection` may act as this session's scanner
    pub fn accepts_scanner(&self, connection: ConnectionId) -> bool {
        self.scanner.map_or(true, |scanner| scanner == connection)
    }
}

/// A session removed from the store, with the reason it ended
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub session: Session,
    pub reason: CloseReason,
}

/// Summary information about a session for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub state: SessionState,
    pub scanner_attached: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.to_string(),
            state: session.state,
            scanner_attached: session.scanner.is_some(),
            created_at: session.created_at,
            last_activity: session.last_activity,
        }
    }
}
