//! HuePair Auth - Session matching and challenge verification
//!
//! Pairs an initiator (a display looping a short color sequence) with a
//! scanner (a camera that reads the sequence back) into one session.
//!
//! # Pairing Flow
//!
//! 1. Initiator calls `SessionStore::open()`; a sequence is generated and all
//!    of its rotations are indexed
//! 2. The initiator displays the sequence on a loop
//! 3. Scanner submits what it observed via `SessionStore::identify()`, which
//!    resolves exact or near matches and returns a fresh challenge
//! 4. Scanner answers the challenge with `attach_scanner()` and then
//!    `finalize()`, handing over its identity payload
//! 5. On success the session and its index entries are removed
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use huepair_auth::{ConnectionId, SessionStore};
//! use huepair_core::Config;
//!
//! async fn example() {
//!     let config = Config::new().with_secret("shared-secret");
//!     let store = SessionStore::new(&config).unwrap();
//!
//!     let session = store.open(ConnectionId::new(), Utc::now()).await;
//!     println!("Show this sequence: {}", session.sequence);
//!
//!     // Later, with what the camera saw
//!     let observed = session.sequence.rotated(2);
//!     if let Ok(found) = store.identify(&observed, Utc::now()).await {
//!         println!("Matched {} (challenge {})", found.session_id, found.challenge.value);
//!     }
//! }
//! ```

pub mod challenge;
pub mod matcher;
pub mod rotation;
pub mod session;
pub mod store;

pub use challenge::{Challenge, ChallengeIssuer};
pub use matcher::{similarity, FuzzyMatcher, Match};
pub use rotation::{IndexEntry, RotationIndex};
pub use session::{
    CloseReason, ClosedSession, ConnectionId, Session, SessionId, SessionInfo, SessionState,
};
pub use store::{
    Identified, PairingError, PairingResult, SessionStore, MAX_GENERATION_ATTEMPTS,
};
