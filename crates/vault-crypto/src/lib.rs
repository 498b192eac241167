//! vault-crypto: server-side encryption for the secrets vault
//!
//! Two pieces:
//! ```text
//! token    = hex(HMAC-SHA256(server_secret, password))       (session token == password verifier)
//! envelope = AES-256-GCM(key = key_file[0..32], nonce = token[0..12])
//! ```
//!
//! The token is deterministic per password and doubles as the nonce source,
//! so every field sealed for one account reuses one nonce under the shared
//! master key. Tampering is still detected by the GCM tag, but ciphertexts of
//! one account are not confidential against each other. The scheme is kept
//! bit-compatible with existing data; do not build new features on it.

pub mod envelope;
pub mod token;

pub use envelope::{CipherEnvelope, CryptoError};
pub use token::{tokens_match, TokenDeriver, LEGACY_TOKEN_SECRET};

/// Size of the AES-256 master key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
