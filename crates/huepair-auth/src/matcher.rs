//! Resolving observed sequences to sessions
//!
//! Camera sampling is noisy, so an exact key lookup is only the fast path.
//! On a miss every indexed rotation of the same length is scored by how many
//! individual symbols agree, and the best candidate is accepted if it clears
//! the similarity floor.

use crate::rotation::RotationIndex;
use crate::session::SessionId;
use huepair_core::{Config, Sequence};
use tracing::debug;

/// A resolved lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub session_id: SessionId,
    /// Index key that matched
    pub key: String,
    /// 1.0 for an exact hit
    pub score: f64,
    pub exact: bool,
}

/// Fraction of core and aura symbols that agree position by position
///
/// `None` when the sequences differ in length, since they can never match.
pub fn similarity(observed: &Sequence, candidate: &Sequence) -> Option<f64> {
    if observed.len() != candidate.len() || observed.is_empty() {
        return None;
    }

    let agreeing: usize = observed
        .steps()
        .iter()
        .zip(candidate.steps())
        .map(|(o, c)| usize::from(o.core == c.core) + usize::from(o.aura == c.aura))
        .sum();

    Some(agreeing as f64 / (2 * observed.len()) as f64)
}

/// Exact-then-fuzzy resolver
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    floor: f64,
}

impl FuzzyMatcher {
    pub fn new(floor: f64) -> Self {
        Self { floor }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.fuzzy_floor)
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Resolve `observed` against the index
    ///
    /// Ties at the best score go to the lexicographically smallest key: the
    /// index iterates in key order and only a strictly higher score replaces
    /// the current best.
    pub fn resolve(&self, index: &RotationIndex, observed: &Sequence) -> Option<Match> {
        let key = observed.key();
        if let Some(entry) = index.get(&key) {
            return Some(Match {
                session_id: entry.session_id.clone(),
                key,
                score: 1.0,
                exact: true,
            });
        }

        let mut best: Option<Match> = None;
        for (candidate_key, entry) in index.iter() {
            let Some(score) = similarity(observed, &entry.rotation) else {
                continue;
            };
            debug!(
                "Comparing {} vs {}: {:.0}%",
                key,
                candidate_key,
                score * 100.0
            );

            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(Match {
                    session_id: entry.session_id.clone(),
                    key: candidate_key.clone(),
                    score,
                    exact: false,
                });
            }
        }

        best.filter(|m| m.score >= self.floor)
    }
}
