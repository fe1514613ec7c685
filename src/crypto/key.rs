use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use std::fmt;
use zeroize::Zeroize;

use super::Algorithm;

/// A symmetric key and its lifecycle metadata.
///
/// Key bytes are wiped on drop and never printed by `Debug`.
#[derive(Clone)]
pub struct EncryptionKey {
    pub key_id: String,
    key_bytes: Vec<u8>,
    pub algorithm: Algorithm,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub rotation_count: u32,
}

impl EncryptionKey {
    /// Generate fresh random key material expiring `lifetime` after `now`.
    pub fn generate(algorithm: Algorithm, lifetime: Duration, now: DateTime<Utc>) -> Self {
        let mut key_bytes = vec![0u8; algorithm.key_len()];
        rand::rng().fill(key_bytes.as_mut_slice());

        Self {
            key_id: new_key_id(),
            key_bytes,
            algorithm,
            created_at: now,
            expires_at: Some(now + lifetime),
            is_active: true,
            rotation_count: 0,
        }
    }

    /// Rebuild a key loaded from the store.
    pub(crate) fn from_parts(
        key_id: String,
        key_bytes: Vec<u8>,
        algorithm: Algorithm,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        is_active: bool,
        rotation_count: u32,
    ) -> Self {
        Self {
            key_id,
            key_bytes,
            algorithm,
            created_at,
            expires_at,
            is_active,
            rotation_count,
        }
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.key_bytes.zeroize();
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key_id", &self.key_id)
            .field("key_bytes", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .field("rotation_count", &self.rotation_count)
            .finish()
    }
}

/// `key_` followed by 16 random hex digits.
fn new_key_id() -> String {
    let mut raw = [0u8; 8];
    rand::rng().fill(&mut raw);
    let hex: String = raw.iter().map(|b| format!("{:02x}", b)).collect();
    format!("key_{}", hex)
}
