//! WebSocket protocol message types
//!
//! Every frame is a JSON object tagged by `"type"`. Initiators (the display
//! showing the color sequence) and scanners (the camera device) share one
//! endpoint; the role of a connection follows from the messages it sends.

use crate::error::Result;
use crate::sequence::Sequence;
use serde::{Deserialize, Serialize};

/// An observed sequence as submitted by a scanner
///
/// Scanners may send either the key string (`"RG-GB-BR-RR"`) or the list of
/// steps. Both are decoded once, here, into a [`Sequence`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceInput {
    Key(String),
    Steps(Sequence),
}

impl SequenceInput {
    pub fn decode(self) -> Result<Sequence> {
        match self {
            SequenceInput::Key(key) => Sequence::from_key(&key),
            SequenceInput::Steps(sequence) => Ok(sequence),
        }
    }
}

/// Client-to-server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Initiator asks for a new pairing session
    CreateSession,
    /// Scanner submits the sequence it observed
    IdentifySession { sequence: SequenceInput },
    /// Scanner asks for a fresh challenge on a known session
    GetChallenge { session_id: String },
    /// Scanner joins a session, proving freshness with the challenge
    JoinSession {
        session_id: String,
        response: String,
        bucket: i64,
    },
    /// Scanner completes pairing, handing over the identity payload
    AuthHandshake {
        session_id: String,
        /// Opaque identity payload relayed to both parties
        user: serde_json::Value,
        response: String,
        bucket: i64,
    },
}

impl ClientMessage {
    /// Parse a JSON text frame
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Server-to-client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent to the initiator after `create-session`
    SessionCreated {
        session_id: String,
        sequence: Sequence,
        challenge: String,
        bucket: i64,
    },
    /// Sent to the scanner when its sequence resolved to a session
    SessionFound {
        session_id: String,
        challenge: String,
        bucket: i64,
    },
    /// Reply to `get-challenge`
    Challenge { challenge: String, bucket: i64 },
    /// Sent to both parties once the scanner has joined
    ScannerConnected { session_id: String },
    /// Sent to the initiator when its scanner's connection drops
    ScannerDisconnected { session_id: String },
    /// Sent to both parties when pairing completes
    AuthSuccess { user: serde_json::Value },
    /// Error message
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
