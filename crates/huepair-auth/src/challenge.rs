//! Time-windowed challenges
//!
//! A challenge is derived from the shared secret and a coarse time bucket:
//! `hex(SHA-256(secret ++ "-" ++ bucket))`, truncated for display. It is a pure
//! function of (secret, bucket), so re-issuing inside one bucket is idempotent.
//!
//! Verification accepts the current bucket and up to `tolerance` buckets either
//! side of it. A challenge is a capability token, not a MAC over the request:
//! anyone holding a valid (challenge, bucket) pair can replay it until the
//! window closes.

use chrono::{DateTime, Utc};
use huepair_core::Config;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A challenge value and the bucket it was minted for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub value: String,
    pub bucket: i64,
}

/// Issues and verifies challenges for one shared secret
#[derive(Debug, Clone)]
pub struct ChallengeIssuer {
    secret: String,
    window_secs: u64,
    length: usize,
    tolerance: u64,
}

impl ChallengeIssuer {
    /// Create an issuer with a 16-character challenge and a one-window tolerance
    pub fn new(secret: impl Into<String>, window_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            window_secs: window_secs.max(1),
            length: 16,
            tolerance: 1,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.secret.clone(), config.window_secs)
            .with_length(config.challenge_length)
            .with_tolerance(config.replay_tolerance)
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn with_tolerance(mut self, windows: u64) -> Self {
        self.tolerance = windows;
        self
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// `floor(now / window)`
    pub fn time_bucket(&self, now: DateTime<Utc>) -> i64 {
        let window = i64::try_from(self.window_secs).unwrap_or(i64::MAX);
        now.timestamp().div_euclid(window)
    }

    /// Mint the challenge for the bucket `now` falls in
    pub fn issue(&self, now: DateTime<Utc>) -> Challenge {
        let bucket = self.time_bucket(now);
        Challenge {
            value: self.issue_for(bucket),
            bucket,
        }
    }

    /// The challenge value for an explicit bucket
    pub fn issue_for(&self, bucket: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}-{}", self.secret, bucket).as_bytes());
        let mut value = hex::encode(hasher.finalize());
        value.truncate(self.length);
        value
    }

    /// Accept `response` iff `bucket` is within tolerance of the current
    /// bucket and the response is the challenge minted for `bucket`
    pub fn verify(&self, response: &str, bucket: i64, now: DateTime<Utc>) -> bool {
        let current = self.time_bucket(now);
        if current.abs_diff(bucket) > self.tolerance {
            return false;
        }
        response == self.issue_for(bucket)
    }
}
