//! vault-store: durable account and record metadata
//!
//! The store never sees plaintext: inline fields arrive hex-encoded
//! ciphertext, file records carry only a backing-file path and encrypted
//! metadata. Every operation reports success, `NotFound`, `AlreadyExists`,
//! or an opaque `Internal` error so callers can map outcomes uniformly.

pub mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use vault_core::types::{Account, AccountId, FileKind};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("store error: {0}")]
    Internal(String),
}

/// Login/password record; every field is hex(ciphertext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineRecord {
    pub login: String,
    pub password: String,
    pub meta: String,
}

/// Text/binary record: where the ciphertext lives, plus hex(ciphertext) metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub meta: String,
    /// Plaintext bytes per sealed frame in the backing file
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_block_size() -> usize {
    1000
}

/// How an upsert treats an existing live record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Insert; `AlreadyExists` if a live record has the same key
    Create,
    /// Replace all fields; `NotFound` if no live record has the key
    Replace,
}

/// Persistence collaborator for the vault server.
///
/// At most one live (non-deleted) record exists per
/// `(account, record key, kind)`. Soft-deleted rows are retained but never
/// returned.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_account(&self, login: &str, password_verifier: &str) -> StoreResult<Account>;

    async fn find_account_by_login(&self, login: &str) -> StoreResult<Account>;

    async fn upsert_inline_record(
        &self,
        account: AccountId,
        key: &str,
        record: InlineRecord,
        mode: UpsertMode,
    ) -> StoreResult<()>;

    async fn get_inline_record(&self, account: AccountId, key: &str) -> StoreResult<InlineRecord>;

    async fn soft_delete_inline_record(&self, account: AccountId, key: &str) -> StoreResult<()>;

    async fn upsert_file_record(
        &self,
        account: AccountId,
        kind: FileKind,
        key: &str,
        record: FileRecord,
        mode: UpsertMode,
    ) -> StoreResult<()>;

    async fn get_file_record(
        &self,
        account: AccountId,
        kind: FileKind,
        key: &str,
    ) -> StoreResult<FileRecord>;

    async fn soft_delete_file_record(
        &self,
        account: AccountId,
        kind: FileKind,
        key: &str,
    ) -> StoreResult<()>;
}

/// Shared handle used by the server components
pub type SharedStore = Arc<dyn CredentialStore>;
