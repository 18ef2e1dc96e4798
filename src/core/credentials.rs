//! Password hashing and verification.
//!
//! Two schemes are understood:
//!
//! - **Current**: Argon2id PHC strings (`$argon2id$v=19$...`), salted per password.
//! - **Legacy**: unsalted SHA-256 hex digests written by the previous back office.
//!
//! [`verify_password`] tries the current scheme first and falls back to the legacy
//! one. Any match that is not already a current-parameter Argon2id hash is reported
//! as [`Verification::NeedsRehash`] so the caller can store a fresh hash.

use crate::errors::Result;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};

/// Outcome of checking a password against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Password matches and the stored hash is current
    Valid,
    /// Password matches but the stored hash should be replaced
    NeedsRehash,
    /// Password does not match
    Invalid,
}

impl Verification {
    /// True for both matching outcomes.
    #[must_use]
    pub const fn is_match(self) -> bool {
        matches!(self, Self::Valid | Self::NeedsRehash)
    }
}

/// Hashes `password` with the current scheme.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Checks `password` against `stored`, current scheme first, then legacy.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> Verification {
    if let Ok(parsed) = PasswordHash::new(stored) {
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            return Verification::Invalid;
        }
        return if is_current(&parsed) {
            Verification::Valid
        } else {
            Verification::NeedsRehash
        };
    }

    if legacy_digest(password).eq_ignore_ascii_case(stored.trim()) {
        Verification::NeedsRehash
    } else {
        Verification::Invalid
    }
}

/// Legacy scheme: lowercase hex SHA-256 of the raw password.
#[must_use]
pub fn legacy_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn is_current(parsed: &PasswordHash<'_>) -> bool {
    let defaults = argon2::Params::default();
    parsed.algorithm == argon2::Algorithm::Argon2id.ident()
        && argon2::Params::try_from(parsed).is_ok_and(|params| {
            params.m_cost() == defaults.m_cost()
                && params.t_cost() == defaults.t_cost()
                && params.p_cost() == defaults.p_cost()
        })
}
