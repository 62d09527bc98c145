//! Random short code generation with a bounded uniqueness retry loop

use rand::rngs::StdRng;
use rand::{Rng, RngExt, SeedableRng};
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// The 62-symbol alphabet used for generated codes
pub const ALPHANUMERIC: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const DEFAULT_CODE_LENGTH: usize = 7;
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Error)]
pub enum CodeGenError {
    #[error("no free short code found after {attempts} attempts")]
    Exhausted { attempts: usize },
    #[error("short code alphabet must contain at least two distinct symbols")]
    InvalidAlphabet,
    #[error("short code length must be at least 1")]
    InvalidLength,
    #[error(transparent)]
    Check(#[from] anyhow::Error),
}

/// Draws codes uniformly from an alphabet using an injected random source.
///
/// The default source is a `StdRng` seeded from the thread-local CSPRNG, so
/// codes are not guessable from previous ones. Tests inject a seeded `StdRng`.
pub struct CodeGenerator<R = StdRng> {
    alphabet: Vec<char>,
    length: usize,
    max_attempts: usize,
    rng: Mutex<R>,
}

impl CodeGenerator<StdRng> {
    pub fn new(length: usize, max_attempts: usize) -> Result<Self, CodeGenError> {
        Self::with_rng(
            ALPHANUMERIC,
            length,
            max_attempts,
            StdRng::from_rng(&mut rand::rng()),
        )
    }
}

impl<R: Rng> CodeGenerator<R> {
    pub fn with_rng(
        alphabet: &str,
        length: usize,
        max_attempts: usize,
        rng: R,
    ) -> Result<Self, CodeGenError> {
        let mut symbols: Vec<char> = alphabet.chars().collect();
        symbols.sort_unstable();
        symbols.dedup();
        if symbols.len() < 2 {
            return Err(CodeGenError::InvalidAlphabet);
        }
        if length == 0 {
            return Err(CodeGenError::InvalidLength);
        }

        Ok(Self {
            // keep caller order so a fixed seed yields the same codes
            alphabet: alphabet.chars().collect(),
            length,
            // at least one draw, otherwise generation could never succeed
            max_attempts: max_attempts.max(1),
            rng: Mutex::new(rng),
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Whether `code` could have been produced by this generator's alphabet
    pub fn is_in_alphabet(&self, code: &str) -> bool {
        code.chars().all(|c| self.alphabet.contains(&c))
    }

    /// Draw a single code; every position is independent and uniform
    pub fn generate(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..self.length)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
            .collect()
    }

    /// Draw codes until `is_taken` reports a free one, giving up after
    /// `max_attempts` draws.
    pub async fn generate_unique<F, Fut>(&self, mut is_taken: F) -> Result<String, CodeGenError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        for attempt in 1..=self.max_attempts {
            let code = self.generate();
            if !is_taken(code.clone()).await? {
                return Ok(code);
            }
            tracing::debug!(attempt, "generated short code already taken, retrying");
        }

        Err(CodeGenError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
