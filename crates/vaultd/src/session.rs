//! Session authority: register/login turn a password into a session token.

use tracing::info;

use vault_core::types::SessionToken;
use vault_core::{VaultError, VaultResult};
use vault_crypto::TokenDeriver;
use vault_store::{SharedStore, StoreError};

pub struct SessionAuthority {
    store: SharedStore,
    deriver: TokenDeriver,
}

impl SessionAuthority {
    pub fn new(store: SharedStore, deriver: TokenDeriver) -> Self {
        Self { store, deriver }
    }

    /// Create an account whose password verifier is the issued token.
    pub async fn register(&self, login: &str, password: &str) -> VaultResult<SessionToken> {
        if login.is_empty() {
            return Err(VaultError::InvalidArgument("login must not be empty"));
        }
        let token = self.deriver.derive(password);
        match self.store.create_account(login, token.as_str()).await {
            Ok(account) => {
                info!(account = %account.id, "account registered");
                Ok(token)
            }
            Err(StoreError::AlreadyExists) => {
                info!("login already taken");
                Err(VaultError::AlreadyExists(
                    "a client with this login already exists",
                ))
            }
            Err(StoreError::NotFound) => Err(VaultError::internal(
                "unable to register client",
                "store reported not-found on insert",
            )),
            Err(StoreError::Internal(detail)) => {
                Err(VaultError::internal("unable to register client", detail))
            }
        }
    }

    /// Recompute the token from `password` and accept it only if it equals
    /// the stored verifier.
    pub async fn login(&self, login: &str, password: &str) -> VaultResult<SessionToken> {
        let account = match self.store.find_account_by_login(login).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                return Err(VaultError::NotFound(
                    "the client with this login doesn't exist",
                ))
            }
            Err(err) => return Err(VaultError::internal("unable to authorize client", err)),
        };

        if !self.deriver.verify(password, &account.password_verifier) {
            info!(account = %account.id, "incorrect password");
            return Err(VaultError::InvalidCredential);
        }

        info!(account = %account.id, "client authorized");
        Ok(self.deriver.derive(password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vault_store::LocalStore;

    fn authority() -> SessionAuthority {
        SessionAuthority::new(
            Arc::new(LocalStore::in_memory()),
            TokenDeriver::new("test-secret"),
        )
    }

    #[tokio::test]
    async fn test_register_then_login_returns_same_token() {
        let sessions = authority();
        let registered = sessions.register("alice", "s3cret").await.unwrap();
        let logged_in = sessions.login("alice", "s3cret").await.unwrap();

        assert_eq!(registered, logged_in);
        assert_eq!(registered, TokenDeriver::new("test-secret").derive("s3cret"));
    }

    #[tokio::test]
    async fn test_register_duplicate_login() {
        let sessions = authority();
        sessions.register("alice", "s3cret").await.unwrap();
        assert!(matches!(
            sessions.register("alice", "other").await,
            Err(VaultError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_login_wrong_password_is_invalid_credential() {
        let sessions = authority();
        sessions.register("alice", "s3cret").await.unwrap();
        for wrong in ["", "s3cret ", "S3CRET", "another"] {
            assert!(matches!(
                sessions.login("alice", wrong).await,
                Err(VaultError::InvalidCredential)
            ));
        }
    }

    #[tokio::test]
    async fn test_login_unknown_account() {
        let sessions = authority();
        assert!(matches!(
            sessions.login("nobody", "pw").await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_empty_login() {
        let sessions = authority();
        assert!(matches!(
            sessions.register("", "pw").await,
            Err(VaultError::InvalidArgument(_))
        ));
    }
}
