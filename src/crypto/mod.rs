//! Symmetric key lifecycle and authenticated encryption.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ manager.rs   KeyManager: current key, rotate, encrypt/decrypt │
//! ├──────────────────┬──────────────────┬─────────────────────────┤
//! │ algorithm.rs     │ key.rs           │ store.rs                │
//! │ Algorithm enum + │ EncryptionKey,   │ JSON key store, 0600,   │
//! │ Cipher seal/open │ zeroize on drop  │ fallback on write error │
//! └──────────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! # Ciphertext format
//!
//! `ALGORITHM:key_id:base64(payload)`, where the payload layout depends on
//! the algorithm:
//!
//! | Algorithm | Payload |
//! |-----------|---------|
//! | `AES-256-GCM` | `nonce(12) \| tag(16) \| ciphertext` |
//! | `AES-256-CBC` | `iv(16) \| hmac_sha256(32) \| ciphertext (PKCS7)` |
//! | `ChaCha20-Poly1305` | `nonce(12) \| ciphertext \| tag(16)`, AAD `authenticated_data` |
//!
//! Decryption reads the key id and algorithm from the header, so it never
//! depends on which key is current. Retired keys stay decryptable until
//! they are purged.

mod algorithm;
mod key;
mod manager;
mod store;

pub use algorithm::{Algorithm, Cipher};
pub use key::EncryptionKey;
pub use manager::{Ciphertext, EncryptionStatus, KeyManager, KeySettings};
pub use store::KeyStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Bad algorithm name or key setup. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tamper, corruption, or unknown key. Never silently ignored.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Key store unreadable or unwritable.
    #[error("key store error: {0}")]
    Persistence(String),
}
