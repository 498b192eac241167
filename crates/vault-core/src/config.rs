use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level server configuration (loaded from vaultd.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP listen address for gRPC (default: 127.0.0.1:8400)
    pub listen: String,
    /// PEM certificate chain for TLS
    pub tls_cert: Option<PathBuf>,
    /// PEM private key for TLS
    pub tls_key: Option<PathBuf>,
    /// Refuse to start without a TLS identity
    pub enforce_tls: bool,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding encrypted backing files for text/binary records
    pub data_dir: PathBuf,
    /// JSON state file for accounts and record metadata
    pub credential_db: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// File whose first 32 bytes are the AES-256 master key
    pub cipher_key_file: PathBuf,
    /// Plaintext bytes sealed per persisted frame
    pub block_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for session token derivation (falls back to the legacy built-in)
    pub token_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8400".into(),
            tls_cert: None,
            tls_key: None,
            enforce_tls: false,
            log_level: "info".into(),
            log_format: "json".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/vault/data"),
            credential_db: PathBuf::from("/var/lib/vault/credentials.json"),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            cipher_key_file: PathBuf::from("/etc/vault/cipher.key"),
            block_size: 1000,
        }
    }
}
