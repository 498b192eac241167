//! Local credential store: in-memory state, optionally persisted to a JSON file.
//!
//! Every mutation is applied to a copy of the state, flushed atomically
//! (write temp file, then rename), and only then made visible. A failed flush
//! leaves both the file and the in-memory view unchanged.
//!
//! Mutations are serialized by a writer lock held across the flush; the
//! state itself is only write-locked for the final swap, so lookups keep
//! running while a flush is on disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use vault_core::types::{Account, AccountId, FileKind};

use crate::{
    CredentialStore, FileRecord, InlineRecord, StoreError, StoreResult, UpsertMode,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row<T> {
    account: AccountId,
    key: String,
    record: T,
    deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRow {
    kind: FileKind,
    #[serde(flatten)]
    row: Row<FileRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreState {
    /// login → account
    accounts: HashMap<String, Account>,
    inline: Vec<Row<InlineRecord>>,
    files: Vec<FileRow>,
}

impl StoreState {
    fn find_inline(&self, account: AccountId, key: &str) -> Option<&Row<InlineRecord>> {
        self.inline
            .iter()
            .find(|r| !r.deleted && r.account == account && r.key == key)
    }

    fn find_file(
        &self,
        account: AccountId,
        kind: FileKind,
        key: &str,
    ) -> Option<&Row<FileRecord>> {
        self.files
            .iter()
            .find(|f| f.kind == kind && !f.row.deleted && f.row.account == account && f.row.key == key)
            .map(|f| &f.row)
    }

    fn live_inline(&mut self, account: AccountId, key: &str) -> Option<&mut Row<InlineRecord>> {
        self.inline
            .iter_mut()
            .find(|r| !r.deleted && r.account == account && r.key == key)
    }

    fn live_file(
        &mut self,
        account: AccountId,
        kind: FileKind,
        key: &str,
    ) -> Option<&mut Row<FileRecord>> {
        self.files
            .iter_mut()
            .find(|f| f.kind == kind && !f.row.deleted && f.row.account == account && f.row.key == key)
            .map(|f| &mut f.row)
    }
}

/// Credential store backed by process memory and an optional JSON file
pub struct LocalStore {
    db_path: Option<PathBuf>,
    state: RwLock<StoreState>,
    writer: Mutex<()>,
}

impl LocalStore {
    /// Volatile store (tests, ephemeral deployments)
    pub fn in_memory() -> Self {
        Self {
            db_path: None,
            state: RwLock::new(StoreState::default()),
            writer: Mutex::new(()),
        }
    }

    /// Load or create a store persisted at `db_path`.
    pub async fn open(db_path: &Path) -> StoreResult<Self> {
        let state = match tokio::fs::read_to_string(db_path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StoreError::Internal(format!("parsing {}: {e}", db_path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => {
                return Err(StoreError::Internal(format!(
                    "reading {}: {e}",
                    db_path.display()
                )))
            }
        };

        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    /// Number of accounts, for startup logging
    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    async fn read<T>(&self, f: impl FnOnce(&StoreState) -> StoreResult<T>) -> StoreResult<T> {
        let state = self.state.read().await;
        f(&state)
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _writer = self.writer.lock().await;
        let mut next = self.state.read().await.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.db_path {
            persist(path, &next).await?;
        }
        *self.state.write().await = next;
        Ok(out)
    }
}

async fn persist(path: &Path, state: &StoreState) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::Internal(format!("creating {}: {e}", parent.display())))?;
    }

    let json = serde_json::to_vec_pretty(state)
        .map_err(|e| StoreError::Internal(format!("serializing store: {e}")))?;

    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| StoreError::Internal(format!("writing {}: {e}", tmp_path.display())))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::Internal(format!("renaming {}: {e}", path.display())))?;

    debug!(path = %path.display(), bytes = json.len(), "credential store flushed");
    Ok(())
}

#[async_trait]
impl CredentialStore for LocalStore {
    async fn create_account(&self, login: &str, password_verifier: &str) -> StoreResult<Account> {
        self.mutate(|state| {
            if state.accounts.contains_key(login) {
                return Err(StoreError::AlreadyExists);
            }
            let account = Account {
                id: AccountId::new_random(),
                login: login.to_string(),
                password_verifier: password_verifier.to_string(),
            };
            state.accounts.insert(login.to_string(), account.clone());
            Ok(account)
        })
        .await
    }

    async fn find_account_by_login(&self, login: &str) -> StoreResult<Account> {
        self.read(|state| state.accounts.get(login).cloned().ok_or(StoreError::NotFound))
            .await
    }

    async fn upsert_inline_record(
        &self,
        account: AccountId,
        key: &str,
        record: InlineRecord,
        mode: UpsertMode,
    ) -> StoreResult<()> {
        self.mutate(|state| match (state.live_inline(account, key), mode) {
            (Some(_), UpsertMode::Create) => Err(StoreError::AlreadyExists),
            (None, UpsertMode::Replace) => Err(StoreError::NotFound),
            (Some(row), UpsertMode::Replace) => {
                row.record = record;
                Ok(())
            }
            (None, UpsertMode::Create) => {
                state.inline.push(Row {
                    account,
                    key: key.to_string(),
                    record,
                    deleted: false,
                });
                Ok(())
            }
        })
        .await
    }

    async fn get_inline_record(&self, account: AccountId, key: &str) -> StoreResult<InlineRecord> {
        self.read(|state| {
            state
                .find_inline(account, key)
                .map(|row| row.record.clone())
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn soft_delete_inline_record(&self, account: AccountId, key: &str) -> StoreResult<()> {
        self.mutate(|state| {
            let row = state.live_inline(account, key).ok_or(StoreError::NotFound)?;
            row.deleted = true;
            Ok(())
        })
        .await
    }

    async fn upsert_file_record(
        &self,
        account: AccountId,
        kind: FileKind,
        key: &str,
        record: FileRecord,
        mode: UpsertMode,
    ) -> StoreResult<()> {
        self.mutate(|state| match (state.live_file(account, kind, key), mode) {
            (Some(_), UpsertMode::Create) => Err(StoreError::AlreadyExists),
            (None, UpsertMode::Replace) => Err(StoreError::NotFound),
            (Some(row), UpsertMode::Replace) => {
                row.record = record;
                Ok(())
            }
            (None, UpsertMode::Create) => {
                state.files.push(FileRow {
                    kind,
                    row: Row {
                        account,
                        key: key.to_string(),
                        record,
                        deleted: false,
                    },
                });
                Ok(())
            }
        })
        .await
    }

    async fn get_file_record(
        &self,
        account: AccountId,
        kind: FileKind,
        key: &str,
    ) -> StoreResult<FileRecord> {
        self.read(|state| {
            state
                .find_file(account, kind, key)
                .map(|row| row.record.clone())
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn soft_delete_file_record(
        &self,
        account: AccountId,
        kind: FileKind,
        key: &str,
    ) -> StoreResult<()> {
        self.mutate(|state| {
            let row = state
                .live_file(account, kind, key)
                .ok_or(StoreError::NotFound)?;
            row.deleted = true;
            Ok(())
        })
        .await
    }
}
