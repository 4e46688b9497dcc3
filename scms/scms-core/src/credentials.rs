//! Password verifiers.
//!
//! A verifier is the scrypt output for `password` salted with a fixed phrase
//! followed by the account email, using the same cost parameters as the
//! document key.

use crate::codec::{derive_key, KEY_LEN};
use crate::error::Result;
use subtle::ConstantTimeEq;

pub const DEFAULT_SALT_PHRASE: &str = "You are the salt of the earth. But if the salt loses its saltiness, how can it be made salty again?";

#[derive(Clone, Debug)]
pub struct PasswordHasher {
    salt_phrase: String,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_SALT_PHRASE)
    }
}

impl PasswordHasher {
    pub fn new(salt_phrase: impl Into<String>) -> Self {
        Self {
            salt_phrase: salt_phrase.into(),
        }
    }

    pub fn derive(&self, email: &str, password: &str) -> Result<Vec<u8>> {
        let salt = format!("{}{}", self.salt_phrase, email);
        let key = derive_key(password.as_bytes(), salt.as_bytes())?;
        Ok(key.to_vec())
    }

    /// Constant-time comparison against a stored verifier. A verifier of the
    /// wrong length never matches.
    pub fn verify(&self, email: &str, password: &str, verifier: &[u8]) -> Result<bool> {
        if verifier.len() != KEY_LEN {
            return Ok(false);
        }
        let candidate = self.derive(email, password)?;
        Ok(candidate.as_slice().ct_eq(verifier).into())
    }
}
