//! Password hashing and strength policy — Argon2id.
//!
//! Hashes are PHC-format strings (e.g. `$argon2id$v=19$m=65536,t=3,p=4$...`)
//! and therefore self-describing: `verify` reads the cost parameters out of
//! the stored hash, so the configured parameters can be raised later without
//! invalidating hashes produced under older settings.
//!
//! Plaintext passwords are never logged and never appear in error values.

use crate::error::{AuthError, Result};
use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
};
use argon2::{Algorithm, Argon2, Params, Version};

/// Argon2id cost parameters.
///
/// Defaults keep brute-forcing expensive under GPU/ASIC attack: 64 MiB of
/// memory, 3 iterations, 4 lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,

    /// Time cost (iterations).
    pub time_cost: u32,

    /// Parallelism (lanes).
    pub parallelism: u32,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Argon2id password hasher.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Create a hasher with the given cost parameters.
    ///
    /// # Errors
    ///
    /// Returns error if the parameters are outside Argon2's accepted ranges.
    pub fn new(params: PasswordParams) -> Result<Self> {
        let params = Params::new(
            params.memory_kib,
            params.time_cost,
            params.parallelism,
            None,
        )
        .map_err(|e| AuthError::Provider(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password. Returns a PHC-format string.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails (the message never echoes the
    /// password).
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Provider(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Verify a password against a stored PHC-format hash.
    ///
    /// Cost parameters are taken from the hash itself, so hashes produced
    /// under older settings still verify.
    ///
    /// # Errors
    ///
    /// Returns error if the stored hash is malformed. A simple mismatch is
    /// `Ok(false)`, not an error.
    pub fn verify(&self, stored_hash: &str, password: &str) -> Result<bool> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| AuthError::Provider(format!("stored password hash is malformed: {e}")))?;
        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Validate password strength before hashing.
///
/// Policy: minimum 8 characters, at least one letter and one digit.
///
/// # Errors
///
/// Returns [`AuthError::WeakPassword`] with a descriptive reason.
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword {
            reason: "must be at least 8 characters".to_string(),
        });
    }
    if !password.chars().any(char::is_alphabetic) {
        return Err(AuthError::WeakPassword {
            reason: "must contain at least one letter".to_string(),
        });
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword {
            reason: "must contain at least one digit".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cheap parameters so the suite stays fast; production cost comes from
    // `PasswordParams::default`.
    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(PasswordParams {
            memory_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_hash_and_verify_round_trip() {
        let hasher = fast_hasher();
        let hash = hasher.hash("Secure123").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(&hash, "Secure123").unwrap());
        assert!(!hasher.verify(&hash, "Secure124").unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = fast_hasher();
        let a = hasher.hash("Secure123").unwrap();
        let b = hasher.hash("Secure123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_accepts_hash_from_older_parameters() {
        // Hash under one cost configuration, verify under another.
        let old = fast_hasher();
        let hash = old.hash("Secure123").unwrap();

        let new = PasswordHasher::new(PasswordParams {
            memory_kib: 2048,
            time_cost: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(new.verify(&hash, "Secure123").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error_not_a_mismatch() {
        let hasher = fast_hasher();
        assert!(hasher.verify("not-a-phc-string", "Secure123").is_err());
    }

    #[test]
    fn test_password_strength_policy() {
        assert!(validate_password_strength("Secure123").is_ok());

        // Too short
        assert!(matches!(
            validate_password_strength("Ab1"),
            Err(AuthError::WeakPassword { .. })
        ));
        // No digit
        assert!(matches!(
            validate_password_strength("NoDigitsHere"),
            Err(AuthError::WeakPassword { .. })
        ));
        // No letter
        assert!(matches!(
            validate_password_strength("1234567890"),
            Err(AuthError::WeakPassword { .. })
        ));
    }
}
