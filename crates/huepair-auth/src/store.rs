//! Session store
//!
//! Owns the session map and the rotation index behind a single lock, so a
//! session and its index entries are always created and torn down together.
//! Every operation takes the lock once, does in-memory work only, and hands
//! the connections to notify back to the caller instead of sending anything
//! itself.
//!
//! # Lifecycle
//!
//! ```text
//! open ──► Open ──attach_scanner──► Joined ──finalize──► Closed(Paired)
//!           │  ◄──────detach_scanner──────┘
//!           │  └──────────────finalize─────────────────► Closed(Paired)
//!           └─────close_by_initiator / sweep_idle──────► Closed(Abandoned)
//! ```

use crate::challenge::{Challenge, ChallengeIssuer};
use crate::matcher::{FuzzyMatcher, Match};
use crate::rotation::RotationIndex;
use crate::session::{
    ClosedSession, CloseReason, ConnectionId, Session, SessionId, SessionState,
};
use chrono::{DateTime, Utc};
use huepair_core::{Config, Sequence, SequenceGenerator};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Attempts at drawing a sequence that does not collide with a live session
/// before accepting a collision
pub const MAX_GENERATION_ATTEMPTS: usize = 8;

/// Pairing errors
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Session not found")]
    NotFound,
    #[error("No session found for this pattern")]
    NoMatch,
    #[error("Invalid challenge")]
    InvalidChallenge,
    /// A rotation key pointed at a session that no longer exists
    #[error("Session expired")]
    ZombieIndex(SessionId),
    #[error("Session already has a scanner")]
    ScannerConflict,
    #[error(transparent)]
    Core(#[from] huepair_core::Error),
}

impl PairingError {
    /// Whether the caller should treat this as a plain miss
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PairingError::NotFound | PairingError::NoMatch | PairingError::ZombieIndex(_)
        )
    }
}

pub type PairingResult<T> = Result<T, PairingError>;

/// Result of a successful sequence lookup
#[derive(Debug, Clone)]
pub struct Identified {
    pub session_id: SessionId,
    pub challenge: Challenge,
    pub matched: Match,
}

/// Abandon sessions that a new `open` for (`id`, `initiator`) replaces
fn abandon_previous(inner: &mut StoreInner, id: &SessionId, initiator: ConnectionId) {
    let stale: Vec<SessionId> = inner
        .sessions
        .values()
        .filter(|s| s.initiator == initiator || s.id == *id)
        .map(|s| s.id.clone())
        .collect();
    for stale_id in stale {
        if inner.teardown(&stale_id).is_some() {
            info!("Abandoned session {} replaced by a new session", stale_id);
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    sessions: HashMap<SessionId, Session>,
    index: RotationIndex,
}

impl StoreInner {
    /// Remove a session and its rotations; `None` if already gone
    fn teardown(&mut self, id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        let removed = self.index.unregister(id, &session.sequence);
        debug!("Unregistered {} rotation keys of session {}", removed, id);
        Some(session)
    }
}

/// Single source of truth for pairing sessions
pub struct SessionStore {
    inner: RwLock<StoreInner>,
    generator: SequenceGenerator,
    issuer: ChallengeIssuer,
    matcher: FuzzyMatcher,
    session_timeout_secs: u64,
}

impl SessionStore {
    /// Create a store from a validated configuration
    pub fn new(config: &Config) -> PairingResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: RwLock::new(StoreInner::default()),
            generator: SequenceGenerator::from_config(config)?,
            issuer: ChallengeIssuer::from_config(config),
            matcher: FuzzyMatcher::from_config(config),
            session_timeout_secs: config.session_timeout_secs,
        })
    }

    pub fn issuer(&self) -> &ChallengeIssuer {
        &self.issuer
    }

    /// Open a session with a generated ID
    pub async fn open(&self, initiator: ConnectionId, now: DateTime<Utc>) -> Session {
        self.open_with_id(SessionId::generate(), initiator, now).await
    }

    /// Open a session under a caller-supplied ID
    ///
    /// Any session the initiator already owns, and any session already using
    /// `id`, is abandoned first together with its rotation keys.
    pub async fn open_with_id(
        &self,
        id: SessionId,
        initiator: ConnectionId,
        now: DateTime<Utc>,
    ) -> Session {
        let mut inner = self.inner.write().await;
        abandon_previous(&mut inner, &id, initiator);

        let mut sequence = self.generator.generate();
        let mut attempts = 1;
        while inner.index.contains_any_rotation(&sequence) && attempts < MAX_GENERATION_ATTEMPTS {
            sequence = self.generator.generate();
            attempts += 1;
        }
        if inner.index.contains_any_rotation(&sequence) {
            warn!(
                "Sequence {} collides with a live session after {} attempts",
                sequence, attempts
            );
        }

        self.install(&mut inner, id, initiator, sequence, now)
    }

    /// Open a session with a known sequence
    #[cfg(test)]
    async fn open_with_sequence(
        &self,
        id: SessionId,
        initiator: ConnectionId,
        sequence: Sequence,
        now: DateTime<Utc>,
    ) -> Session {
        let mut inner = self.inner.write().await;
        abandon_previous(&mut inner, &id, initiator);
        self.install(&mut inner, id, initiator, sequence, now)
    }

    fn install(
        &self,
        inner: &mut StoreInner,
        id: SessionId,
        initiator: ConnectionId,
        sequence: Sequence,
        now: DateTime<Utc>,
    ) -> Session {
        let challenge = self.issuer.issue(now);
        inner.index.register(&id, &sequence);

        let session = Session::new(id.clone(), initiator, sequence, challenge, now);
        inner.sessions.insert(id.clone(), session.clone());

        info!(
            "Created session {} with sequence {} ({} active)",
            id,
            session.sequence,
            inner.sessions.len()
        );
        session
    }

    /// Resolve an observed sequence and refresh the matched session's challenge
    ///
    /// A miss never touches any session.
    pub async fn identify(
        &self,
        observed: &Sequence,
        now: DateTime<Utc>,
    ) -> PairingResult<Identified> {
        let mut inner = self.inner.write().await;

        let Some(matched) = self.matcher.resolve(&inner.index, observed) else {
            info!("No session matches sequence {}", observed);
            return Err(PairingError::NoMatch);
        };

        if !inner.sessions.contains_key(&matched.session_id) {
            let pruned = inner.index.purge_session(&matched.session_id);
            warn!(
                "Zombie index entry {} for missing session {}; pruned {} keys",
                matched.key, matched.session_id, pruned
            );
            return Err(PairingError::ZombieIndex(matched.session_id));
        }

        let challenge = self.issuer.issue(now);
        let session = inner
            .sessions
            .get_mut(&matched.session_id)
            .ok_or(PairingError::NotFound)?;
        session.challenge = challenge.clone();
        session.touch(now);

        if matched.exact {
            info!("Sequence {} matched session {}", observed, matched.session_id);
        } else {
            info!(
                "Sequence {} fuzzy-matched {} of session {} ({:.0}% similar)",
                observed,
                matched.key,
                matched.session_id,
                matched.score * 100.0
            );
        }

        Ok(Identified {
            session_id: matched.session_id.clone(),
            challenge,
            matched,
        })
    }

    /// Read-only lookup, without refreshing anything
    pub async fn resolve(&self, observed: &Sequence) -> Option<Match> {
        let inner = self.inner.read().await;
        self.matcher
            .resolve(&inner.index, observed)
            .filter(|m| inner.sessions.contains_key(&m.session_id))
    }

    /// Re-issue the challenge for a session
    pub async fn refresh_challenge(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> PairingResult<Challenge> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.get_mut(id).ok_or(PairingError::NotFound)?;

        let challenge = self.issuer.issue(now);
        session.challenge = challenge.clone();
        session.touch(now);
        Ok(challenge)
    }

    /// Attach a scanner after verifying its challenge response
    ///
    /// Returns the initiator connection so the caller can tell it the scanner
    /// arrived. Re-attaching the same scanner is allowed.
    pub async fn attach_scanner(
        &self,
        id: &SessionId,
        scanner: ConnectionId,
        response: &str,
        bucket: i64,
        now: DateTime<Utc>,
    ) -> PairingResult<ConnectionId> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.get_mut(id).ok_or(PairingError::NotFound)?;

        if !session.accepts_scanner(scanner) {
            warn!("Second scanner tried to join session {}", id);
            return Err(PairingError::ScannerConflict);
        }
        if !self.issuer.verify(response, bucket, now) {
            warn!("Invalid challenge response for session {}", id);
            return Err(PairingError::InvalidChallenge);
        }

        session.scanner = Some(scanner);
        session.state = SessionState::Joined;
        session.touch(now);
        info!("Scanner {} joined session {}", scanner, id);
        Ok(session.initiator)
    }

    /// Verify the final handshake and close the session as paired
    ///
    /// On failure the session is left exactly as it was.
    pub async fn finalize(
        &self,
        id: &SessionId,
        scanner: ConnectionId,
        response: &str,
        bucket: i64,
        now: DateTime<Utc>,
    ) -> PairingResult<ClosedSession> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.get(id).ok_or(PairingError::NotFound)?;

        if !session.accepts_scanner(scanner) {
            warn!("Handshake from a foreign scanner on session {}", id);
            return Err(PairingError::ScannerConflict);
        }
        if !self.issuer.verify(response, bucket, now) {
            warn!("Invalid handshake challenge for session {}", id);
            return Err(PairingError::InvalidChallenge);
        }

        let mut session = inner.teardown(id).ok_or(PairingError::NotFound)?;
        session.scanner = Some(scanner);
        session.touch(now);

        info!(
            "Session {} paired ({} active)",
            id,
            inner.sessions.len()
        );
        Ok(ClosedSession {
            session,
            reason: CloseReason::Paired,
        })
    }

    /// Abandon every session owned by a disconnected initiator
    ///
    /// Safe to call for connections that own nothing, or whose session was
    /// already finalized.
    pub async fn close_by_initiator(&self, initiator: ConnectionId) -> Vec<ClosedSession> {
        let mut inner = self.inner.write().await;

        let owned: Vec<SessionId> = inner
            .sessions
            .values()
            .filter(|s| s.initiator == initiator)
            .map(|s| s.id.clone())
            .collect();

        let closed: Vec<ClosedSession> = owned
            .iter()
            .filter_map(|id| inner.teardown(id))
            .map(|session| ClosedSession {
                session,
                reason: CloseReason::Abandoned,
            })
            .collect();

        for c in &closed {
            info!("Cleaned up session {} after initiator disconnect", c.session.id);
        }
        closed
    }

    /// Release every session a disconnected scanner had joined
    ///
    /// The sessions stay live and go back to `Open`, so a reconnecting
    /// scanner (with a new connection) can identify and join again. Returns
    /// each released session with its initiator.
    pub async fn detach_scanner(&self, scanner: ConnectionId) -> Vec<(SessionId, ConnectionId)> {
        let mut inner = self.inner.write().await;

        let mut released = Vec::new();
        for session in inner.sessions.values_mut() {
            if session.scanner == Some(scanner) {
                session.scanner = None;
                session.state = SessionState::Open;
                info!("Scanner {} left session {}", scanner, session.id);
                released.push((session.id.clone(), session.initiator));
            }
        }
        released
    }

    /// Abandon sessions with no activity for the configured timeout
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> Vec<ClosedSession> {
        let mut inner = self.inner.write().await;

        let idle: Vec<SessionId> = inner
            .sessions
            .values()
            .filter(|s| s.is_idle(now, self.session_timeout_secs))
            .map(|s| s.id.clone())
            .collect();

        let closed: Vec<ClosedSession> = idle
            .iter()
            .filter_map(|id| inner.teardown(id))
            .map(|session| ClosedSession {
                session,
                reason: CloseReason::Abandoned,
            })
            .collect();

        for c in &closed {
            info!("Session {} expired after {}s idle", c.session.id, self.session_timeout_secs);
        }
        closed
    }

    /// Snapshot of a live session
    pub async fn session(&self, id: &SessionId) -> Option<Session> {
        self.inner.read().await.sessions.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    /// Number of rotation keys currently indexed
    pub async fn index_len(&self) -> usize {
        self.inner.read().await.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    const T0: i64 = 1_700_000_010;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn create_test_store() -> SessionStore {
        SessionStore::new(&Config::new().with_secret("test-secret")).unwrap()
    }

    fn seq(key: &str) -> Sequence {
        Sequence::from_key(key).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        assert!(SessionStore::new(&Config::new()).is_err());
    }

    #[tokio::test]
    async fn test_pairing_flow() {
        let store = create_test_store();
        let initiator = ConnectionId::new();
        let scanner = ConnectionId::new();

        let session = store.open(initiator, at(T0)).await;
        assert_eq!(session.sequence.len(), 4);
        assert_eq!(session.state, SessionState::Open);
        assert_eq!(store.len().await, 1);
        assert!(store.index_len().await >= 1);

        // Scanner catches the loop two steps in
        let found = store.identify(&session.sequence.rotated(2), at(T0 + 5)).await.unwrap();
        assert_eq!(found.session_id, session.id);
        assert!(found.matched.exact);

        let notified = store
            .attach_scanner(&session.id, scanner, &found.challenge.value, found.challenge.bucket, at(T0 + 6))
            .await
            .unwrap();
        assert_eq!(notified, initiator);
        assert_eq!(store.session(&session.id).await.unwrap().state, SessionState::Joined);

        let challenge = store.refresh_challenge(&session.id, at(T0 + 7)).await.unwrap();
        let closed = store
            .finalize(&session.id, scanner, &challenge.value, challenge.bucket, at(T0 + 8))
            .await
            .unwrap();
        assert_eq!(closed.reason, CloseReason::Paired);
        assert_eq!(closed.session.initiator, initiator);
        assert_eq!(closed.session.scanner, Some(scanner));

        assert!(store.is_empty().await);
        assert_eq!(store.index_len().await, 0);
        for rotation in session.sequence.rotations() {
            let err = store.identify(&rotation, at(T0 + 9)).await.unwrap_err();
            assert!(err.is_not_found());
            assert!(store.resolve(&rotation).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_rotation_invariance() {
        let store = create_test_store();
        let session = store.open(ConnectionId::new(), at(T0)).await;

        for rotation in session.sequence.rotations() {
            let found = store.identify(&rotation, at(T0)).await.unwrap();
            assert_eq!(found.session_id, session.id);
        }
    }

    #[tokio::test]
    async fn test_fixed_sequence_scenario() {
        let store = create_test_store();
        let id = SessionId::from("fixed");

        store
            .open_with_sequence(id.clone(), ConnectionId::new(), seq("RG-GB-BR-RR"), at(T0))
            .await;

        let exact = store.identify(&seq("GB-BR-RR-RG"), at(T0)).await.unwrap();
        assert_eq!(exact.session_id, id);
        assert!(exact.matched.exact);

        let fuzzy = store.identify(&seq("GB-BR-RR-RB"), at(T0)).await.unwrap();
        assert_eq!(fuzzy.session_id, id);
        assert_eq!(fuzzy.matched.score, 0.875);

        let miss = store.identify(&seq("GB-BG-GG-GB"), at(T0)).await.unwrap_err();
        assert!(matches!(miss, PairingError::NoMatch));

        // A miss leaves the session alone
        assert!(store.session(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_identify_refreshes_challenge() {
        let store = create_test_store();
        let session = store.open(ConnectionId::new(), at(T0)).await;

        let found = store.identify(&session.sequence, at(T0 + 45)).await.unwrap();
        assert_eq!(found.challenge.bucket, session.challenge.bucket + 1);

        let stored = store.session(&session.id).await.unwrap();
        assert_eq!(stored.challenge, found.challenge);
        assert_eq!(stored.last_activity, at(T0 + 45));
    }

    #[tokio::test]
    async fn test_refresh_unknown_session() {
        let store = create_test_store();
        let result = store.refresh_challenge(&SessionId::from("nope"), at(T0)).await;
        assert!(matches!(result, Err(PairingError::NotFound)));
    }

    #[tokio::test]
    async fn test_attach_errors() {
        let store = create_test_store();
        let session = store.open(ConnectionId::new(), at(T0)).await;
        let scanner = ConnectionId::new();
        let challenge = session.challenge.clone();

        let missing = store
            .attach_scanner(&SessionId::from("nope"), scanner, &challenge.value, challenge.bucket, at(T0))
            .await;
        assert!(matches!(missing, Err(PairingError::NotFound)));

        let wrong = store
            .attach_scanner(&session.id, scanner, "0000000000000000", challenge.bucket, at(T0))
            .await;
        assert!(matches!(wrong, Err(PairingError::InvalidChallenge)));

        // Replayed two full windows later
        let stale = store
            .attach_scanner(&session.id, scanner, &challenge.value, challenge.bucket, at(T0 + 60))
            .await;
        assert!(matches!(stale, Err(PairingError::InvalidChallenge)));
        assert_eq!(store.session(&session.id).await.unwrap().state, SessionState::Open);

        store
            .attach_scanner(&session.id, scanner, &challenge.value, challenge.bucket, at(T0 + 1))
            .await
            .unwrap();
        // Same scanner again is fine, a different one is not
        store
            .attach_scanner(&session.id, scanner, &challenge.value, challenge.bucket, at(T0 + 2))
            .await
            .unwrap();
        let other = store
            .attach_scanner(&session.id, ConnectionId::new(), &challenge.value, challenge.bucket, at(T0 + 3))
            .await;
        assert!(matches!(other, Err(PairingError::ScannerConflict)));
    }

    #[tokio::test]
    async fn test_failed_finalize_leaves_session_intact() {
        let store = create_test_store();
        let session = store.open(ConnectionId::new(), at(T0)).await;
        let keys = store.index_len().await;

        let result = store
            .finalize(&session.id, ConnectionId::new(), "bogus", session.challenge.bucket, at(T0))
            .await;
        assert!(matches!(result, Err(PairingError::InvalidChallenge)));
        assert!(store.session(&session.id).await.is_some());
        assert_eq!(store.index_len().await, keys);
        assert!(store.resolve(&session.sequence).await.is_some());
    }

    #[tokio::test]
    async fn test_finalize_without_join() {
        let store = create_test_store();
        let session = store.open(ConnectionId::new(), at(T0)).await;
        let scanner = ConnectionId::new();

        let closed = store
            .finalize(&session.id, scanner, &session.challenge.value, session.challenge.bucket, at(T0 + 31))
            .await
            .unwrap();
        assert_eq!(closed.session.scanner, Some(scanner));
        assert!(store.is_empty().await);

        let again = store
            .finalize(&session.id, scanner, &session.challenge.value, session.challenge.bucket, at(T0 + 32))
            .await;
        assert!(matches!(again, Err(PairingError::NotFound)));
    }

    #[tokio::test]
    async fn test_reconnected_scanner_can_pair() {
        let store = create_test_store();
        let initiator = ConnectionId::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        let session = store.open(initiator, at(T0)).await;
        let found = store.identify(&session.sequence, at(T0 + 1)).await.unwrap();
        store
            .attach_scanner(&session.id, first, &found.challenge.value, found.challenge.bucket, at(T0 + 2))
            .await
            .unwrap();

        let keys = store.index_len().await;
        let released = store.detach_scanner(first).await;
        assert_eq!(released, vec![(session.id.clone(), initiator)]);
        let snapshot = store.session(&session.id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Open);
        assert_eq!(snapshot.scanner, None);
        assert_eq!(store.index_len().await, keys);

        // Second call finds nothing to release
        assert!(store.detach_scanner(first).await.is_empty());

        let found = store.identify(&session.sequence.rotated(1), at(T0 + 3)).await.unwrap();
        let notified = store
            .attach_scanner(&session.id, second, &found.challenge.value, found.challenge.bucket, at(T0 + 4))
            .await
            .unwrap();
        assert_eq!(notified, initiator);

        let closed = store
            .finalize(&session.id, second, &found.challenge.value, found.challenge.bucket, at(T0 + 5))
            .await
            .unwrap();
        assert_eq!(closed.session.scanner, Some(second));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_detach_ignores_other_connections() {
        let store = create_test_store();
        let initiator = ConnectionId::new();
        let scanner = ConnectionId::new();

        let session = store.open(initiator, at(T0)).await;
        store
            .attach_scanner(&session.id, scanner, &session.challenge.value, session.challenge.bucket, at(T0))
            .await
            .unwrap();

        assert!(store.detach_scanner(initiator).await.is_empty());
        assert!(store.detach_scanner(ConnectionId::new()).await.is_empty());
        assert_eq!(store.session(&session.id).await.unwrap().scanner, Some(scanner));
    }

    #[tokio::test]
    async fn test_close_by_initiator() {
        let store = create_test_store();
        let initiator = ConnectionId::new();
        let bystander = ConnectionId::new();

        let session = store.open(initiator, at(T0)).await;
        let other = store.open(bystander, at(T0)).await;

        store.refresh_challenge(&session.id, at(T0 + 1)).await.unwrap();
        let closed = store.close_by_initiator(initiator).await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, CloseReason::Abandoned);

        assert!(store.session(&session.id).await.is_none());
        assert!(store.session(&other.id).await.is_some());
        assert_eq!(store.len().await, 1);
        for rotation in session.sequence.rotations() {
            match store.resolve(&rotation).await {
                None => {}
                // Only the bystander may still answer, via the fuzzy path
                Some(m) => assert_eq!(m.session_id, other.id),
            }
        }

        // Idempotent
        assert!(store.close_by_initiator(initiator).await.is_empty());
        store.close_by_initiator(bystander).await;
        assert_eq!(store.index_len().await, 0);
    }

    #[tokio::test]
    async fn test_reopen_abandons_previous_session() {
        let store = create_test_store();
        let initiator = ConnectionId::new();

        let first = store.open(initiator, at(T0)).await;
        let second = store.open(initiator, at(T0 + 1)).await;

        assert_ne!(first.id, second.id);
        assert_eq!(store.len().await, 1);
        assert!(store.session(&first.id).await.is_none());

        let live = store.session(&second.id).await.unwrap();
        let keys: HashSet<String> = live.sequence.rotations().iter().map(Sequence::key).collect();
        assert_eq!(store.index_len().await, keys.len());
    }

    #[tokio::test]
    async fn test_open_with_existing_id_replaces_session() {
        let store = create_test_store();
        let id = SessionId::from("shared");

        store.open_with_id(id.clone(), ConnectionId::new(), at(T0)).await;
        let replacement = store.open_with_id(id.clone(), ConnectionId::new(), at(T0 + 1)).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.session(&id).await.unwrap().initiator, replacement.initiator);
    }

    #[tokio::test]
    async fn test_zombie_entry_is_reported_and_pruned() {
        let store = create_test_store();
        let ghost = SessionId::from("ghost");
        let sequence = seq("RG-GB-BR-RR");
        store.inner.write().await.index.register(&ghost, &sequence);

        let err = store.identify(&sequence, at(T0)).await.unwrap_err();
        assert!(matches!(err, PairingError::ZombieIndex(ref id) if *id == ghost));
        assert!(err.is_not_found());
        assert_eq!(store.index_len().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_idle() {
        let config = Config::new()
            .with_secret("test-secret")
            .with_session_timeout_secs(300);
        let store = SessionStore::new(&config).unwrap();

        let stale = store.open(ConnectionId::new(), at(T0)).await;
        let active = store.open(ConnectionId::new(), at(T0)).await;
        store.refresh_challenge(&active.id, at(T0 + 200)).await.unwrap();

        assert!(store.sweep_idle(at(T0 + 299)).await.is_empty());

        let swept = store.sweep_idle(at(T0 + 300)).await;
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].session.id, stale.id);
        assert_eq!(swept[0].reason, CloseReason::Abandoned);
        assert!(store.session(&active.id).await.is_some());

        let swept = store.sweep_idle(at(T0 + 500)).await;
        assert_eq!(swept.len(), 1);
        assert!(store.is_empty().await);
        assert_eq!(store.index_len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_attach_races_disconnect() {
        let store = Arc::new(create_test_store());
        let now = Utc::now();

        for _ in 0..200 {
            let initiator = ConnectionId::new();
            let scanner = ConnectionId::new();
            let session = store.open(initiator, now).await;
            let challenge = session.challenge.clone();

            let attach = {
                let store = store.clone();
                let id = session.id.clone();
                tokio::spawn(async move {
                    store
                        .attach_scanner(&id, scanner, &challenge.value, challenge.bucket, now)
                        .await
                })
            };
            let close = {
                let store = store.clone();
                tokio::spawn(async move { store.close_by_initiator(initiator).await })
            };

            let attached = attach.await.unwrap();
            let closed = close.await.unwrap();

            assert_eq!(closed.len(), 1);
            let snapshot = &closed[0].session;
            match attached {
                Ok(notified) => {
                    assert_eq!(notified, initiator);
                    assert_eq!(snapshot.state, SessionState::Joined);
                    assert_eq!(snapshot.scanner, Some(scanner));
                }
                Err(e) => {
                    assert!(matches!(e, PairingError::NotFound));
                    assert_eq!(snapshot.state, SessionState::Open);
                    assert_eq!(snapshot.scanner, None);
                }
            }
            assert!(store.session(&session.id).await.is_none());
        }

        assert!(store.is_empty().await);
        assert_eq!(store.index_len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_finalize_races_disconnect() {
        let store = Arc::new(create_test_store());
        let now = Utc::now();

        for _ in 0..200 {
            let initiator = ConnectionId::new();
            let session = store.open(initiator, now).await;
            let challenge = session.challenge.clone();

            let finalize = {
                let store = store.clone();
                let id = session.id.clone();
                tokio::spawn(async move {
                    store
                        .finalize(&id, ConnectionId::new(), &challenge.value, challenge.bucket, now)
                        .await
                })
            };
            let close = {
                let store = store.clone();
                tokio::spawn(async move { store.close_by_initiator(initiator).await })
            };

            let finalized = finalize.await.unwrap();
            let closed = close.await.unwrap();

            // Exactly one teardown wins
            assert_eq!(finalized.is_ok(), closed.is_empty());
        }

        assert!(store.is_empty().await);
        assert_eq!(store.index_len().await, 0);
    }
}
