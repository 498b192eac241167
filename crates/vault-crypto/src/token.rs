//! Session token derivation: `hex(HMAC-SHA256(server_secret, password))`

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use vault_core::types::SessionToken;

type HmacSha256 = Hmac<Sha256>;

/// Secret used by deployments that never configured one. Tokens issued
/// under it stay valid only while it remains in use.
pub const LEGACY_TOKEN_SECRET: &str = "SecretKey";

/// Derives session tokens (which double as password verifiers).
///
/// Deterministic: the same password always yields the same token, and a
/// token never expires. Knowing the token is equivalent to knowing the
/// password for every authenticated call.
pub struct TokenDeriver {
    secret: SecretString,
}

impl TokenDeriver {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
        }
    }

    pub fn legacy() -> Self {
        Self::new(LEGACY_TOKEN_SECRET)
    }

    pub fn derive(&self, password: &str) -> SessionToken {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(password.as_bytes());
        SessionToken::new(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a password against a stored verifier without early exit.
    pub fn verify(&self, password: &str, verifier: &str) -> bool {
        tokens_match(self.derive(password).as_str(), verifier)
    }
}

impl std::fmt::Debug for TokenDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenDeriver")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Constant-time token comparison
pub fn tokens_match(presented: &str, stored: &str) -> bool {
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}
