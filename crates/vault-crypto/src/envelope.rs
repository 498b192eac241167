//! AES-256-GCM envelope keyed by a server-local key file
//!
//! Sealed format: `[ciphertext][16-byte GCM tag]`, no embedded nonce. The
//! nonce is the first 12 bytes of the caller-supplied nonce source.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::{KEY_SIZE, NONCE_SIZE};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("reading cipher key {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cipher key too short: {0} bytes (need 32)")]
    ShortKey(usize),

    #[error("nonce source too short: {0} bytes (need 12)")]
    ShortNonceSource(usize),

    #[error("encryption failed")]
    Encryption,

    #[error("authentication failed: wrong key, wrong nonce source, or corrupted data")]
    AuthenticationFailed,
}

enum KeySource {
    /// Re-read on every call so a replaced key file takes effect immediately
    File(PathBuf),
    Fixed(Zeroizing<[u8; KEY_SIZE]>),
}

/// Symmetric authenticated encryption shared by all accounts
pub struct CipherEnvelope {
    source: KeySource,
}

impl CipherEnvelope {
    pub fn from_key_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: KeySource::File(path.into()),
        }
    }

    pub fn from_key(key: [u8; KEY_SIZE]) -> Self {
        Self {
            source: KeySource::Fixed(Zeroizing::new(key)),
        }
    }

    /// Load the key once to surface a missing or short key file at startup.
    pub fn check(&self) -> Result<(), CryptoError> {
        self.load_key().map(|_| ())
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce_source: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher()?;
        let nonce = nonce_prefix(nonce_source)?;
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::Encryption)
    }

    pub fn decrypt(&self, sealed: &[u8], nonce_source: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher()?;
        let nonce = nonce_prefix(nonce_source)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        let key = self.load_key()?;
        Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::ShortKey(key.len()))
    }

    fn load_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
        match &self.source {
            KeySource::Fixed(key) => Ok(key.clone()),
            KeySource::File(path) => read_key_file(path),
        }
    }
}

impl std::fmt::Debug for CipherEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            KeySource::File(path) => path.display().to_string(),
            KeySource::Fixed(_) => "[REDACTED]".to_string(),
        };
        f.debug_struct("CipherEnvelope")
            .field("key", &source)
            .finish()
    }
}

/// Only the first 32 bytes of the file are key material.
fn read_key_file(path: &Path) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    let raw = Zeroizing::new(std::fs::read(path).map_err(|source| CryptoError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?);
    if raw.len() < KEY_SIZE {
        return Err(CryptoError::ShortKey(raw.len()));
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&raw[..KEY_SIZE]);
    Ok(key)
}

fn nonce_prefix(nonce_source: &[u8]) -> Result<&[u8], CryptoError> {
    nonce_source
        .get(..NONCE_SIZE)
        .ok_or(CryptoError::ShortNonceSource(nonce_source.len()))
}
