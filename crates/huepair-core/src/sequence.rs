//! Color sequences and their canonical keys
//!
//! A [`Sequence`] is the pairing token: a short, cyclic list of [`Step`]s, each
//! made of a `core` color and an `aura` color. The initiator renders it on a
//! loop and the scanner samples it back, possibly starting mid-cycle, which is
//! why every consumer works on rotations rather than on one fixed ordering.
//!
//! The canonical string form (the *key*) concatenates each step's core and aura
//! and joins steps with [`STEP_SEPARATOR`], e.g. `RG-GB-BR-RR`.

use crate::config::Config;
use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Separator placed between steps in a sequence key
pub const STEP_SEPARATOR: char = '-';

/// Red, green and blue: the colors cameras tell apart most reliably
pub const DEFAULT_ALPHABET: [Symbol; 3] = [Symbol('R'), Symbol('G'), Symbol('B')];

/// A single color symbol from the pairing alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct Symbol(char);

impl Symbol {
    /// Create a symbol, rejecting anything that would break the key encoding
    pub fn new(c: char) -> Result<Self> {
        if c.is_ascii_alphanumeric() {
            Ok(Self(c))
        } else {
            Err(Error::InvalidSymbol(c))
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }

    /// Parse an alphabet such as `"RGB"` into distinct symbols
    pub fn parse_alphabet(s: &str) -> Result<Vec<Symbol>> {
        let mut alphabet: Vec<Symbol> = Vec::new();
        for c in s.chars().filter(|c| !c.is_whitespace() && *c != ',') {
            let symbol = Symbol::new(c)?;
            if alphabet.contains(&symbol) {
                return Err(Error::config(format!("duplicate symbol '{}' in alphabet", c)));
            }
            alphabet.push(symbol);
        }
        if alphabet.is_empty() {
            return Err(Error::config("alphabet must contain at least one symbol"));
        }
        Ok(alphabet)
    }
}

impl TryFrom<char> for Symbol {
    type Error = Error;

    fn try_from(c: char) -> Result<Self> {
        Symbol::new(c)
    }
}

impl From<Symbol> for char {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One step of a sequence: the core color and the aura around it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    pub core: Symbol,
    pub aura: Symbol,
}

impl Step {
    pub fn new(core: Symbol, aura: Symbol) -> Self {
        Self { core, aura }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.core, self.aura)
    }
}

/// An ordered, non-empty list of steps
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Step>", into = "Vec<Step>")]
pub struct Sequence(Vec<Step>);

impl Sequence {
    /// Create a sequence from its steps
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::invalid_sequence("sequence has no steps"));
        }
        Ok(Self(steps))
    }

    /// Decode a key such as `RG-GB-BR-RR`
    pub fn from_key(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::invalid_sequence("empty sequence key"));
        }

        let steps = key
            .split(STEP_SEPARATOR)
            .map(|part| {
                let mut chars = part.chars();
                match (chars.next(), chars.next(), chars.next()) {
                    (Some(core), Some(aura), None) => {
                        Ok(Step::new(Symbol::new(core)?, Symbol::new(aura)?))
                    }
                    _ => Err(Error::invalid_sequence(format!(
                        "step '{}' must be exactly two symbols",
                        part
                    ))),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical key: lossless and deterministic, so equal sequences
    /// always produce equal keys
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(Step::to_string)
            .collect::<Vec<_>>()
            .join(&STEP_SEPARATOR.to_string())
    }

    /// Cyclic left rotation: `seq[offset..] ++ seq[..offset]`
    pub fn rotated(&self, offset: usize) -> Sequence {
        let mut steps = self.0.clone();
        steps.rotate_left(offset % self.0.len());
        Sequence(steps)
    }

    /// All `len()` rotations, ordered by offset
    pub fn rotations(&self) -> Vec<Sequence> {
        (0..self.len()).map(|offset| self.rotated(offset)).collect()
    }
}

impl TryFrom<Vec<Step>> for Sequence {
    type Error = Error;

    fn try_from(steps: Vec<Step>) -> Result<Self> {
        Sequence::new(steps)
    }
}

impl From<Sequence> for Vec<Step> {
    fn from(sequence: Sequence) -> Self {
        sequence.0
    }
}

impl FromStr for Sequence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Sequence::from_key(s)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Draws random sequences over a fixed alphabet
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    alphabet: Vec<Symbol>,
    length: usize,
}

impl SequenceGenerator {
    pub fn new(alphabet: Vec<Symbol>, length: usize) -> Result<Self> {
        if alphabet.is_empty() {
            return Err(Error::config("alphabet must contain at least one symbol"));
        }
        if length == 0 {
            return Err(Error::config("sequence length must be at least 1"));
        }
        Ok(Self { alphabet, length })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.alphabet.clone(), config.sequence_length)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Generate `length` steps, each core and aura drawn independently and
    /// uniformly from the alphabet
    pub fn generate(&self) -> Sequence {
        let mut rng = rand::thread_rng();
        let steps = (0..self.length)
            .map(|_| {
                let core = self.alphabet[rng.gen_range(0..self.alphabet.len())];
                let aura = self.alphabet[rng.gen_range(0..self.alphabet.len())];
                Step::new(core, aura)
            })
            .collect();

        let sequence = Sequence(steps);
        debug!("Generated sequence {}", sequence);
        sequence
    }
}
