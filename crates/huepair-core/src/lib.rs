//! HuePair Core - Shared types and protocol definitions
//!
//! This crate provides the foundational types used across all HuePair components:
//! the color [`Sequence`] shown by the initiator and read back by the scanner,
//! the runtime [`Config`], and the JSON message set exchanged over WebSocket.

pub mod config;
pub mod error;
pub mod protocol;
pub mod sequence;

pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{ClientMessage, SequenceInput, ServerMessage};
pub use sequence::{Sequence, SequenceGenerator, Step, Symbol, DEFAULT_ALPHABET, STEP_SEPARATOR};
