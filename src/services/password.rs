// Password hashing and verification using Argon2id
// Every hash mixes a process-wide pepper with the per-user salt: the salt
// defeats rainbow tables, the pepper defeats offline cracking of an
// exfiltrated identity store. The pepper is never persisted.

use argon2::{
    password_hash::{rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const MIN_SALT_LENGTH: usize = 8;
pub const MAX_SALT_LENGTH: usize = 64;
pub const MIN_HASH_LENGTH: usize = 16;
pub const MAX_HASH_LENGTH: usize = 64;

/// Errors that can occur during password operations
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid KDF configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to hash password: {0}")]
    Hashing(String),
}

/// Configuration for Argon2id password hashing
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 19456 = 19 MiB, OWASP minimum)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 2)
    pub time_cost: u32,
    /// Parallelism factor (default: 1)
    pub parallelism: u32,
    /// Output hash length in bytes, bounded to [16, 64]
    pub hash_length: usize,
    /// Per-user salt length in bytes, bounded to [8, 64]
    pub salt_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
            hash_length: 32,
            salt_length: 32,
        }
    }
}

/// Password hashing service. Hashing is CPU-heavy (hundreds of ms); call
/// sites on the async path must run it under `spawn_blocking`.
pub struct PasswordService {
    config: PasswordConfig,
    pepper: String,
}

impl PasswordService {
    pub fn new(pepper: String, config: PasswordConfig) -> Result<Self, PasswordError> {
        if pepper.is_empty() {
            return Err(PasswordError::InvalidConfig(
                "password pepper must not be empty".to_string(),
            ));
        }
        if !(MIN_SALT_LENGTH..=MAX_SALT_LENGTH).contains(&config.salt_length) {
            return Err(PasswordError::InvalidConfig(format!(
                "salt length {} outside [{}, {}]",
                config.salt_length, MIN_SALT_LENGTH, MAX_SALT_LENGTH
            )));
        }
        if !(MIN_HASH_LENGTH..=MAX_HASH_LENGTH).contains(&config.hash_length) {
            return Err(PasswordError::InvalidConfig(format!(
                "hash length {} outside [{}, {}]",
                config.hash_length, MIN_HASH_LENGTH, MAX_HASH_LENGTH
            )));
        }
        Ok(Self { config, pepper })
    }

    fn build_hasher(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            Some(self.config.hash_length),
        )
        .map_err(|e| PasswordError::InvalidConfig(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Generate a cryptographically random per-user salt
    pub fn generate_salt(&self) -> Vec<u8> {
        let mut salt = vec![0u8; self.config.salt_length];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    }

    /// KDF input: password || pepper || base64(salt). Argon2 adds its own
    /// internal salt inside the PHC string; the explicit per-user salt
    /// column stays to enable algorithm migration.
    fn keyed_input(&self, password: &str, salt: &[u8]) -> String {
        format!("{}{}{}", password, self.pepper, BASE64.encode(salt))
    }

    /// Hash a password. Returns the PHC string
    /// (`$argon2id$v=19$m=...,t=...,p=...$...`).
    pub fn hash(&self, password: &str, salt: &[u8]) -> Result<String, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::InvalidInput(
                "password must not be empty".to_string(),
            ));
        }
        if salt.is_empty() {
            return Err(PasswordError::InvalidInput(
                "salt must not be empty".to_string(),
            ));
        }

        let argon2 = self.build_hasher()?;
        let kdf_salt = SaltString::generate(&mut SaltRng);
        let input = self.keyed_input(password, salt);

        let password_hash = argon2
            .hash_password(input.as_bytes(), &kdf_salt)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        Ok(password_hash.to_string())
    }

    /// Verify a password against a stored PHC hash. Constant-time inside
    /// the Argon2 verifier; any decoding or parameter mismatch is `false`,
    /// never an error.
    pub fn verify(&self, password: &str, stored_hash: &str, salt: &[u8]) -> bool {
        if password.is_empty() || salt.is_empty() {
            return false;
        }

        let parsed_hash = match PasswordHash::new(stored_hash) {
            Ok(h) => h,
            Err(_) => return false,
        };

        let input = self.keyed_input(password, salt);
        Argon2::default()
            .verify_password(input.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Deterministic one-way transform of an opaque token string. Stable
    /// across processes for a fixed pepper, which makes the refresh token
    /// a O(1) lookup key without persisting the cleartext.
    pub fn hash_token_deterministic(&self, token: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hasher.update(self.pepper.as_bytes());
        hasher.finalize().to_vec()
    }

    /// Hex form of the deterministic hash, used as the storage lookup key
    pub fn token_lookup_key(&self, token: &str) -> String {
        let digest = self.hash_token_deterministic(token);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Constant-time comparison of a token against a stored lookup key
    pub fn token_matches_key(&self, token: &str, stored_key: &str) -> bool {
        let computed = self.token_lookup_key(token);
        computed.as_bytes().ct_eq(stored_key.as_bytes()).into()
    }
}
