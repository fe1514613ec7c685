use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::ChaCha20Poly1305;
use hmac::{Hmac, Mac};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

use super::CryptoError;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub(crate) const KEY_LEN: usize = 32;

const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const CBC_IV_LEN: usize = 16;
const CBC_MAC_LEN: usize = 32;
const CHACHA_NONCE_LEN: usize = 12;
const CHACHA_TAG_LEN: usize = 16;

/// Associated data bound into every ChaCha20-Poly1305 ciphertext.
const CHACHA_AAD: &[u8] = b"authenticated_data";

/// Context string for deriving the CBC MAC subkey from the cipher key.
const CBC_MAC_CONTEXT: &[u8] = b"secops/aes-256-cbc/mac";

/// Authenticated encrypt/decrypt over raw key bytes.
pub trait Cipher {
    /// Encrypt and authenticate `plaintext`, returning the algorithm payload.
    fn seal(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Verify and decrypt an algorithm payload produced by [`Cipher::seal`].
    fn open(&self, key: &[u8], payload: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Supported algorithms. The serialized names are the ciphertext header tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
    #[serde(rename = "AES-256-CBC")]
    Aes256Cbc,
    #[serde(rename = "ChaCha20-Poly1305")]
    ChaCha20Poly1305,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::Aes256Gcm,
        Algorithm::Aes256Cbc,
        Algorithm::ChaCha20Poly1305,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "AES-256-GCM",
            Algorithm::Aes256Cbc => "AES-256-CBC",
            Algorithm::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }

    /// Key length in bytes. All supported algorithms use 256-bit keys.
    pub fn key_len(&self) -> usize {
        KEY_LEN
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CryptoError::Configuration(format!("unsupported algorithm: {}", s)))
    }
}

impl Cipher for Algorithm {
    fn seal(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_key_len(*self, key)?;
        match self {
            Algorithm::Aes256Gcm => seal_gcm(key, plaintext),
            Algorithm::Aes256Cbc => seal_cbc(key, plaintext),
            Algorithm::ChaCha20Poly1305 => seal_chacha(key, plaintext),
        }
    }

    fn open(&self, key: &[u8], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_key_len(*self, key)?;
        match self {
            Algorithm::Aes256Gcm => open_gcm(key, payload),
            Algorithm::Aes256Cbc => open_cbc(key, payload),
            Algorithm::ChaCha20Poly1305 => open_chacha(key, payload),
        }
    }
}

fn check_key_len(algorithm: Algorithm, key: &[u8]) -> Result<(), CryptoError> {
    if key.len() != algorithm.key_len() {
        return Err(CryptoError::Configuration(format!(
            "{} requires a {}-byte key, got {}",
            algorithm,
            algorithm.key_len(),
            key.len()
        )));
    }
    Ok(())
}

fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    bytes
}

fn too_short(algorithm: Algorithm, len: usize) -> CryptoError {
    CryptoError::Decryption(format!("{} payload too short ({} bytes)", algorithm, len))
}

// ── AES-256-GCM ──

fn seal_gcm(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;
    let nonce = random_array::<GCM_NONCE_LEN>();

    // aes-gcm appends the tag; the stored layout puts it before the ciphertext
    let sealed = cipher
        .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("AES-256-GCM seal failed".to_string()))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - GCM_TAG_LEN);

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

fn open_gcm(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if payload.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
        return Err(too_short(Algorithm::Aes256Gcm, payload.len()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;

    let (nonce, rest) = payload.split_at(GCM_NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(GCM_TAG_LEN);

    let mut sealed = Vec::with_capacity(rest.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(aes_gcm::Nonce::from_slice(nonce), sealed.as_slice())
        .map_err(|_| CryptoError::Decryption("AES-256-GCM authentication failed".to_string()))
}

// ── AES-256-CBC + HMAC-SHA256 (encrypt-then-MAC) ──

fn cbc_mac(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, CryptoError> {
    let mut kdf = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;
    kdf.update(CBC_MAC_CONTEXT);
    let mac_key = kdf.finalize().into_bytes();

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&mac_key)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac)
}

fn seal_cbc(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let iv = random_array::<CBC_IV_LEN>();
    let encryptor = Aes256CbcEnc::new_from_slices(key, &iv)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let tag = cbc_mac(key, &iv, &ciphertext)?.finalize().into_bytes();

    let mut out = Vec::with_capacity(CBC_IV_LEN + CBC_MAC_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&tag);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_cbc(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    // At least one padded block follows the IV and tag
    if payload.len() < CBC_IV_LEN + CBC_MAC_LEN + 16 {
        return Err(too_short(Algorithm::Aes256Cbc, payload.len()));
    }
    let (iv, rest) = payload.split_at(CBC_IV_LEN);
    let (tag, ciphertext) = rest.split_at(CBC_MAC_LEN);

    cbc_mac(key, iv, ciphertext)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::Decryption("AES-256-CBC authentication failed".to_string()))?;

    let decryptor = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption("AES-256-CBC invalid padding".to_string()))
}

/// Decrypt a MAC-less `iv|ciphertext` CBC payload written by older
/// deployments. Only PKCS7 padding is checked, so tampering goes unnoticed.
pub(crate) fn open_legacy_cbc(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_key_len(Algorithm::Aes256Cbc, key)?;
    if payload.len() < CBC_IV_LEN + 16 || (payload.len() - CBC_IV_LEN) % 16 != 0 {
        return Err(too_short(Algorithm::Aes256Cbc, payload.len()));
    }
    let (iv, ciphertext) = payload.split_at(CBC_IV_LEN);
    let decryptor = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption("AES-256-CBC invalid padding".to_string()))
}

/// `iv|ciphertext` with no tag, as older deployments wrote it.
#[cfg(test)]
pub(crate) fn legacy_cbc_payload(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let iv = [3u8; CBC_IV_LEN];
    let ct = Aes256CbcEnc::new_from_slices(key, &iv)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mut out = iv.to_vec();
    out.extend_from_slice(&ct);
    out
}

// ── ChaCha20-Poly1305 ──

fn seal_chacha(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;
    let nonce = random_array::<CHACHA_NONCE_LEN>();

    let sealed = cipher
        .encrypt(
            chacha20poly1305::Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: CHACHA_AAD,
            },
        )
        .map_err(|_| CryptoError::Encryption("ChaCha20-Poly1305 seal failed".to_string()))?;

    let mut out = Vec::with_capacity(CHACHA_NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn open_chacha(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if payload.len() < CHACHA_NONCE_LEN + CHACHA_TAG_LEN {
        return Err(too_short(Algorithm::ChaCha20Poly1305, payload.len()));
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::Configuration(e.to_string()))?;
    let (nonce, sealed) = payload.split_at(CHACHA_NONCE_LEN);

    cipher
        .decrypt(
            chacha20poly1305::Nonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: CHACHA_AAD,
            },
        )
        .map_err(|_| {
            CryptoError::Decryption("ChaCha20-Poly1305 authentication failed".to_string())
        })
}
