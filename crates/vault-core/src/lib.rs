pub mod config;
pub mod error;
pub mod types;

pub use error::{VaultError, VaultResult};

/// Generated gRPC types and service traits (from vault.proto)
pub mod proto {
    tonic::include_proto!("vault");
}

/// Call metadata entry carrying the account login
pub const LOGIN_METADATA_KEY: &str = "account-login";

/// Call metadata entry carrying the session token
pub const TOKEN_METADATA_KEY: &str = "session-token";
