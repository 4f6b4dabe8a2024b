//! Short code generation and code-space arithmetic.
//!
//! Codes are fixed-length strings drawn uniformly from a configured alphabet.
//! Uniqueness is not decided here; see [`crate::domain::code_allocator`].

use rand::Rng;

/// Default alphabet: ASCII letters and digits.
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Default code length. 62^8 ≈ 2.2·10¹⁴ possible codes.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Errors raised when an alphabet is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlphabetError {
    #[error("alphabet must not be empty")]
    Empty,
    #[error("alphabet contains duplicate character '{0}'")]
    Duplicate(char),
}

/// A validated set of characters codes are drawn from.
///
/// Characters are distinct, so every character has the same probability of
/// being drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAlphabet {
    chars: Vec<char>,
}

impl CodeAlphabet {
    /// Builds an alphabet from the characters of `symbols`.
    ///
    /// # Errors
    ///
    /// Returns [`AlphabetError`] if `symbols` is empty or repeats a character.
    pub fn new(symbols: &str) -> Result<Self, AlphabetError> {
        let mut chars: Vec<char> = Vec::with_capacity(symbols.len());

        for c in symbols.chars() {
            if chars.contains(&c) {
                return Err(AlphabetError::Duplicate(c));
            }
            chars.push(c);
        }

        if chars.is_empty() {
            return Err(AlphabetError::Empty);
        }

        Ok(Self { chars })
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }
}

impl Default for CodeAlphabet {
    fn default() -> Self {
        Self {
            chars: DEFAULT_ALPHABET.chars().collect(),
        }
    }
}

/// Generates a random code of `length` characters from `alphabet`.
///
/// Uses the thread-local RNG; codes only need to be uniformly distributed,
/// not unpredictable.
pub fn generate_code(alphabet: &CodeAlphabet, length: usize) -> String {
    let mut rng = rand::rng();

    (0..length)
        .map(|_| alphabet.chars[rng.random_range(0..alphabet.chars.len())])
        .collect()
}

/// Number of distinct codes of `length` characters over `alphabet`.
///
/// Returned as `f64` because realistic spaces overflow `u64` quickly.
pub fn code_space_size(alphabet: &CodeAlphabet, length: usize) -> f64 {
    (alphabet.len() as f64).powi(length as i32)
}

/// Probability that a single fresh draw hits one of `existing` codes.
pub fn collision_probability(alphabet: &CodeAlphabet, length: usize, existing: u64) -> f64 {
    (existing as f64 / code_space_size(alphabet, length)).min(1.0)
}
