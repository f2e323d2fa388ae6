//! Secret and hash utilities
//!
//! - Argon2id password and refresh-token hashing, run off the async executor and
//!   bounded by a semaphore
//! - SHA-256 digests for API keys and one-time tokens
//! - Random token, API key and HMAC secret generation
//! - Constant-time comparison

use std::sync::Arc;

use anyhow::{Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use once_cell::sync::Lazy;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

/// Prefix carried by every plaintext API key
pub const API_KEY_PREFIX: &str = "lgk_";

/// Hash verified when no account matches, so the miss costs the same as a hit
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_secret("leadgate-timing-equalizer").ok());

/// Compare two byte slices without short-circuiting on the first difference
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let diff = a
        .iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));

    diff == 0
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// 32 random bytes, base64url without padding
pub fn generate_token() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<32>())
}

/// New plaintext API key (`lgk_` + 43 base64url characters)
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, generate_token())
}

/// New HMAC signing secret (64 hex characters)
pub fn generate_hmac_secret() -> String {
    hex::encode(random_bytes::<32>())
}

/// Short non-sequential identifier safe to show to clients, e.g. `usr_3f9a0c1d2b7e4a65`
pub fn generate_public_id(prefix: &str) -> String {
    format!("{}_{}", prefix, hex::encode(random_bytes::<8>()))
}

/// Hash a secret using Argon2id
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?
        .to_string();
    Ok(hash)
}

/// Verify a secret against an Argon2 PHC string
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

/// Runs Argon2 work on the blocking pool, at most `workers` jobs at a time
#[derive(Clone)]
pub struct PasswordHasherPool {
    permits: Arc<Semaphore>,
}

impl PasswordHasherPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn hash(&self, secret: String) -> Result<String> {
        self.run(move || hash_secret(&secret)).await
    }

    pub async fn verify(&self, secret: String, hash: String) -> Result<bool> {
        self.run(move || verify_secret(&secret, &hash)).await
    }

    /// Burn one verification against a fixed hash; the result is discarded
    pub async fn verify_dummy(&self, secret: String) {
        let Some(hash) = DUMMY_HASH.as_ref() else {
            return;
        };
        let hash = hash.clone();
        let _ = self.verify(secret, hash).await;
    }

    async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("Password hashing pool closed")?;
        tokio::task::spawn_blocking(job)
            .await
            .context("Password hashing task failed")?
    }
}
