//! Configuration types for HuePair

use crate::error::{Error, Result};
use crate::sequence::{Symbol, DEFAULT_ALPHABET};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default challenge window width in seconds
pub const DEFAULT_WINDOW_SECS: u64 = 30;

/// Default number of steps in a pairing sequence
pub const DEFAULT_SEQUENCE_LENGTH: usize = 4;

/// Default fraction of symbol comparisons that must agree for a fuzzy match
pub const DEFAULT_FUZZY_FLOOR: f64 = 0.5;

/// Default idle timeout for sessions that never complete (5 minutes)
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;

/// Largest window or timeout accepted, in seconds (ten years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main configuration for HuePair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Shared secret challenges are derived from
    pub secret: String,
    /// Width of one challenge time bucket in seconds
    pub window_secs: u64,
    /// Symbols sequences are drawn from (red, green, blue by default)
    pub alphabet: Vec<Symbol>,
    /// Steps per sequence
    pub sequence_length: usize,
    /// Minimum similarity accepted by the fuzzy matcher (0.0-1.0)
    pub fuzzy_floor: f64,
    /// How many buckets away from the current one a response may be
    pub replay_tolerance: u64,
    /// Number of hex characters in a challenge
    pub challenge_length: usize,
    /// Sessions idle for longer than this are swept
    pub session_timeout_secs: u64,
    /// How often the idle sweep runs
    pub sweep_interval_secs: u64,
    /// Server port
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret: String::new(),
            window_secs: DEFAULT_WINDOW_SECS,
            alphabet: DEFAULT_ALPHABET.to_vec(),
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            fuzzy_floor: DEFAULT_FUZZY_FLOOR,
            replay_tolerance: 1,
            challenge_length: 16,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            sweep_interval_secs: 30,
            port: 3000,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set shared secret
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Builder pattern: set challenge window width
    pub fn with_window_secs(mut self, window_secs: u64) -> Self {
        self.window_secs = window_secs;
        self
    }

    /// Builder pattern: set alphabet
    pub fn with_alphabet(mut self, alphabet: Vec<Symbol>) -> Self {
        self.alphabet = alphabet;
        self
    }

    /// Builder pattern: set sequence length
    pub fn with_sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = length;
        self
    }

    /// Builder pattern: set fuzzy-match acceptance floor
    pub fn with_fuzzy_floor(mut self, floor: f64) -> Self {
        self.fuzzy_floor = floor;
        self
    }

    /// Builder pattern: set replay tolerance in windows
    pub fn with_replay_tolerance(mut self, windows: u64) -> Self {
        self.replay_tolerance = windows;
        self
    }

    /// Builder pattern: set challenge length
    pub fn with_challenge_length(mut self, length: usize) -> Self {
        self.challenge_length = length;
        self
    }

    /// Builder pattern: set idle session timeout
    pub fn with_session_timeout_secs(mut self, secs: u64) -> Self {
        self.session_timeout_secs = secs;
        self
    }

    /// Builder pattern: set sweep interval
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Check the configuration for values the protocol cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(Error::config("shared secret must not be empty"));
        }
        if self.window_secs == 0 {
            return Err(Error::config("challenge window must be at least 1 second"));
        }
        if self.alphabet.is_empty() {
            return Err(Error::config("alphabet must contain at least one symbol"));
        }
        for (i, symbol) in self.alphabet.iter().enumerate() {
            if self.alphabet[..i].contains(symbol) {
                return Err(Error::config(format!("duplicate symbol '{}' in alphabet", symbol)));
            }
        }
        if self.sequence_length == 0 {
            return Err(Error::config("sequence length must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_floor) {
            return Err(Error::config(format!(
                "fuzzy floor {} is outside 0.0-1.0",
                self.fuzzy_floor
            )));
        }
        // SHA-256 renders to 64 hex characters
        if self.challenge_length == 0 || self.challenge_length > 64 {
            return Err(Error::config("challenge length must be between 1 and 64"));
        }
        if self.window_secs > MAX_DURATION_SECS {
            return Err(Error::config("challenge window is too large"));
        }
        if self.session_timeout_secs == 0 {
            return Err(Error::config("session timeout must be at least 1 second"));
        }
        if self.session_timeout_secs > MAX_DURATION_SECS {
            return Err(Error::config("session timeout is too large"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::config("sweep interval must be at least 1 second"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new().with_secret("s3cret");
        assert_eq!(config.window_secs, 30);
        assert_eq!(config.alphabet.len(), 3);
        assert_eq!(config.sequence_length, 4);
        assert_eq!(config.fuzzy_floor, 0.5);
        assert_eq!(config.replay_tolerance, 1);
        assert_eq!(config.session_timeout(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(Config::new().validate().is_err());
        assert!(Config::new().with_secret("x").with_window_secs(0).validate().is_err());
        assert!(Config::new().with_secret("x").with_sequence_length(0).validate().is_err());
        assert!(Config::new().with_secret("x").with_fuzzy_floor(1.5).validate().is_err());
        assert!(Config::new().with_secret("x").with_challenge_length(65).validate().is_err());
        assert!(Config::new().with_secret("x").with_alphabet(Vec::new()).validate().is_err());

        assert!(Config::new().with_secret("x").with_session_timeout_secs(0).validate().is_err());
        assert!(Config::new().with_secret("x").with_session_timeout_secs(u64::MAX).validate().is_err());
        assert!(Config::new().with_secret("x").with_window_secs(u64::MAX).validate().is_err());
        assert!(Config::new()
            .with_secret("x")
            .with_session_timeout_secs(MAX_DURATION_SECS)
            .validate()
            .is_ok());

        let r = Symbol::new('R').unwrap();
        assert!(Config::new().with_secret("x").with_alphabet(vec![r, r]).validate().is_err());
    }
}
