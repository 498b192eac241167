//! vaultd: secrets vault server
//!
//! Request path:
//! ```text
//! client ──► AuthLayer (auth.rs) ──► VaultService (grpc.rs)
//!               │ resolves Caller         ├─ SessionAuthority     (session.rs)
//!               ▼                         ├─ LoginPasswordRecords (login_password.rs)
//!          CredentialStore ◄──────────────┴─ TransferEngine       (transfer.rs, staging.rs)
//! ```

pub mod auth;
pub mod daemon;
pub mod grpc;
pub mod login_password;
pub mod session;
pub mod staging;
pub mod transfer;

use vault_core::VaultError;
use vault_crypto::CryptoError;
use vault_store::StoreError;

/// Map a record-level store outcome onto the RPC taxonomy.
pub(crate) fn record_error(err: StoreError, context: &'static str) -> VaultError {
    match err {
        StoreError::NotFound => VaultError::NotFound("record not found"),
        StoreError::AlreadyExists => VaultError::AlreadyExists("record already exists"),
        StoreError::Internal(detail) => VaultError::internal(context, detail),
    }
}

pub(crate) fn crypto_error(err: CryptoError, context: &'static str) -> VaultError {
    VaultError::internal(context, err)
}
