//! Inline login/password records.
//!
//! Each field is sealed on its own and stored as hex ciphertext directly in
//! the credential store; no backing file is involved.

use std::sync::Arc;
use tracing::info;

use vault_core::{VaultError, VaultResult};
use vault_crypto::CipherEnvelope;
use vault_store::{InlineRecord, SharedStore, UpsertMode};

use crate::auth::Caller;
use crate::{crypto_error, record_error};

/// Plaintext fields of a login/password record
#[derive(Clone, PartialEq, Eq)]
pub struct LoginPasswordFields {
    pub login: String,
    pub password: String,
    pub meta: String,
}

impl std::fmt::Debug for LoginPasswordFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginPasswordFields")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("meta", &self.meta)
            .finish()
    }
}

pub struct LoginPasswordRecords {
    store: SharedStore,
    envelope: Arc<CipherEnvelope>,
}

impl LoginPasswordRecords {
    pub fn new(store: SharedStore, envelope: Arc<CipherEnvelope>) -> Self {
        Self { store, envelope }
    }

    pub async fn add(
        &self,
        caller: &Caller,
        key: &str,
        fields: &LoginPasswordFields,
    ) -> VaultResult<()> {
        let record = self.seal(caller, fields)?;
        self.store
            .upsert_inline_record(caller.account_id, key, record, UpsertMode::Create)
            .await
            .map_err(|e| record_error(e, "unable to save login-password data"))?;
        info!("login-password record added");
        Ok(())
    }

    /// Replace every field of an existing record.
    pub async fn update(
        &self,
        caller: &Caller,
        key: &str,
        fields: &LoginPasswordFields,
    ) -> VaultResult<()> {
        let record = self.seal(caller, fields)?;
        self.store
            .upsert_inline_record(caller.account_id, key, record, UpsertMode::Replace)
            .await
            .map_err(|e| record_error(e, "unable to update login-password data"))?;
        info!("login-password record updated");
        Ok(())
    }

    pub async fn get(&self, caller: &Caller, key: &str) -> VaultResult<LoginPasswordFields> {
        let record = self
            .store
            .get_inline_record(caller.account_id, key)
            .await
            .map_err(|e| record_error(e, "unable to get login-password data"))?;
        Ok(LoginPasswordFields {
            login: self.open(caller, &record.login)?,
            password: self.open(caller, &record.password)?,
            meta: self.open(caller, &record.meta)?,
        })
    }

    pub async fn delete(&self, caller: &Caller, key: &str) -> VaultResult<()> {
        self.store
            .soft_delete_inline_record(caller.account_id, key)
            .await
            .map_err(|e| record_error(e, "unable to delete login-password data"))?;
        info!("login-password record deleted");
        Ok(())
    }

    fn seal(&self, caller: &Caller, fields: &LoginPasswordFields) -> VaultResult<InlineRecord> {
        let seal_one = |value: &str| {
            self.envelope
                .encrypt(value.as_bytes(), caller.token.as_bytes())
                .map(hex::encode)
                .map_err(|e| crypto_error(e, "unable to encrypt login-password data"))
        };
        Ok(InlineRecord {
            login: seal_one(&fields.login)?,
            password: seal_one(&fields.password)?,
            meta: seal_one(&fields.meta)?,
        })
    }

    fn open(&self, caller: &Caller, hex_sealed: &str) -> VaultResult<String> {
        let sealed = hex::decode(hex_sealed)
            .map_err(|e| VaultError::internal("unable to decode login-password data", e))?;
        let plain = self
            .envelope
            .decrypt(&sealed, caller.token.as_bytes())
            .map_err(|e| crypto_error(e, "unable to decrypt login-password data"))?;
        String::from_utf8(plain)
            .map_err(|e| VaultError::internal("unable to decode login-password data", e))
    }
}
