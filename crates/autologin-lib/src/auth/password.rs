// ============================
// crates/autologin-lib/src/auth/password.rs
// ============================
//! Password hashing and verification.
use crate::error::AuthError;
use argon2::Argon2;
use scrypt::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Scrypt,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// PHC algorithm used for new hashes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordAlgorithm {
    #[default]
    Argon2,
    Scrypt,
}

/// Hashes new passwords and checks presented ones against stored hashes.
///
/// Verification reads the algorithm from the PHC string, so hashes made
/// before an algorithm switch keep working.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialVerifier {
    algorithm: PasswordAlgorithm,
}

impl CredentialVerifier {
    pub fn new(algorithm: PasswordAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> PasswordAlgorithm {
        self.algorithm
    }

    /// Hash a password with the configured algorithm
    pub fn hash_password(&self, plain: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = match self.algorithm {
            PasswordAlgorithm::Argon2 => Argon2::default().hash_password(plain.as_bytes(), &salt),
            PasswordAlgorithm::Scrypt => Scrypt.hash_password(plain.as_bytes(), &salt),
        }
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Hash a password and wipe the plaintext
    pub fn hash_password_secure(&self, plain: &mut String) -> Result<String, AuthError> {
        let hash = self.hash_password(plain);
        plain.zeroize();
        hash
    }

    /// Verify a password against a stored hash.
    ///
    /// Never errors: an unparseable hash or unknown algorithm is a mismatch.
    pub fn verify_password(&self, plain: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        let argon2 = Argon2::default();
        parsed_hash
            .verify_password(&[&argon2, &Scrypt], plain.as_bytes())
            .is_ok()
    }
}

/// Convenience wrapper used by tooling: verify with whatever algorithm the hash names.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    CredentialVerifier::default().verify_password(plain, hash)
}
