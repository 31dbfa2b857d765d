//! Rotation index
//!
//! Maps the key of every cyclic rotation of a live session's sequence to that
//! session, so a scanner that starts sampling mid-cycle still resolves with a
//! single lookup. Entries are ordered by key; the fuzzy matcher relies on that
//! order for a deterministic tie-break.

use crate::session::SessionId;
use huepair_core::Sequence;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One indexed rotation
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub session_id: SessionId,
    pub rotation: Sequence,
}

/// Rotation key -> owning session
#[derive(Debug, Default)]
pub struct RotationIndex {
    entries: BTreeMap<String, IndexEntry>,
}

impl RotationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every rotation of `sequence`, overwriting stale mappings
    pub fn register(&mut self, session_id: &SessionId, sequence: &Sequence) {
        for (offset, rotation) in sequence.rotations().into_iter().enumerate() {
            let key = rotation.key();
            debug!("Mapped rotation {} of session {}: {}", offset, session_id, key);

            let entry = IndexEntry {
                session_id: session_id.clone(),
                rotation,
            };
            if let Some(previous) = self.entries.insert(key.clone(), entry) {
                if previous.session_id != *session_id {
                    warn!(
                        "Rotation key {} moved from session {} to {}",
                        key, previous.session_id, session_id
                    );
                }
            }
        }
    }

    /// Remove the rotations of `sequence` still owned by `session_id`
    ///
    /// Keys already gone, or since taken over by another session, are left
    /// alone, so calling this twice is harmless. Returns the number removed.
    pub fn unregister(&mut self, session_id: &SessionId, sequence: &Sequence) -> usize {
        let mut removed = 0;
        for rotation in sequence.rotations() {
            let key = rotation.key();
            let owned = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.session_id == *session_id);
            if owned {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Remove every key pointing at `session_id`, whatever its sequence
    pub fn purge_session(&mut self, session_id: &SessionId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.session_id != *session_id);
        before - self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Whether any rotation of `sequence` is already indexed
    pub fn contains_any_rotation(&self, sequence: &Sequence) -> bool {
        sequence
            .rotations()
            .iter()
            .any(|rotation| self.entries.contains_key(&rotation.key()))
    }

    /// Entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
