//! Call authorizer: a tower layer in front of the gRPC routes.
//!
//! Every call except Register and Login must carry `account-login` and
//! `session-token` metadata. The login is resolved through the credential
//! store and the token compared with the stored verifier; on success the
//! resolved [`Caller`] is attached to the request extensions, so handlers
//! never re-derive identity from the login string. Each call runs inside an
//! `rpc` span carrying the method and login.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, info_span, warn, Instrument};

use vault_core::types::{AccountId, SessionToken};
use vault_core::{VaultError, VaultResult, LOGIN_METADATA_KEY, TOKEN_METADATA_KEY};
use vault_crypto::tokens_match;
use vault_store::{SharedStore, StoreError};

/// Methods reachable without a session
pub const PUBLIC_METHODS: [&str; 2] = ["/vault.Vault/Register", "/vault.Vault/Login"];

/// Identity resolved for an authenticated call
#[derive(Debug, Clone)]
pub struct Caller {
    pub account_id: AccountId,
    pub login: String,
    /// Validated session token; the nonce source for this caller's records
    pub token: SessionToken,
}

impl Caller {
    /// Pull the caller attached by [`AuthLayer`] out of a request.
    pub fn from_request<T>(request: &tonic::Request<T>) -> VaultResult<Caller> {
        request
            .extensions()
            .get::<Caller>()
            .cloned()
            .ok_or(VaultError::Unauthenticated("missing client identity"))
    }
}

pub struct Authorizer {
    store: SharedStore,
}

impl Authorizer {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Decide whether a call may proceed.
    ///
    /// `Ok(None)` lets a public method through without identity. Unknown
    /// logins are rejected here rather than forwarded.
    pub async fn authorize(
        &self,
        method: &str,
        headers: &http::HeaderMap,
    ) -> VaultResult<Option<Caller>> {
        if PUBLIC_METHODS.contains(&method) {
            return Ok(None);
        }

        let login = header_str(headers, LOGIN_METADATA_KEY)
            .ok_or(VaultError::Unauthenticated("missing client login"))?;
        let token = header_str(headers, TOKEN_METADATA_KEY)
            .ok_or(VaultError::Unauthenticated("missing client token"))?;

        let account = match self.store.find_account_by_login(login).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                return Err(VaultError::Unauthenticated("unknown client login"))
            }
            Err(err) => {
                return Err(VaultError::internal(
                    "error when retrieving client from storage",
                    err,
                ))
            }
        };

        if !tokens_match(token, &account.password_verifier) {
            return Err(VaultError::Unauthenticated("invalid client token"));
        }

        Ok(Some(Caller {
            account_id: account.id,
            login: account.login,
            token: SessionToken::new(token),
        }))
    }
}

fn header_str<'a>(headers: &'a http::HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Tower layer wrapping the gRPC routes with [`Authorizer`]
#[derive(Clone)]
pub struct AuthLayer {
    authorizer: Arc<Authorizer>,
}

impl AuthLayer {
    pub fn new(authorizer: Arc<Authorizer>) -> Self {
        Self { authorizer }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authorizer: self.authorizer.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authorizer: Arc<Authorizer>,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for AuthService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<ReqBody>) -> Self::Future {
        // The clone may not be ready; keep the instance poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let authorizer = self.authorizer.clone();

        let method = request.uri().path().to_string();
        let login = header_str(request.headers(), LOGIN_METADATA_KEY)
            .unwrap_or_default()
            .to_string();
        let span = info_span!("rpc", method = %method, login = %login);

        Box::pin(
            async move {
                match authorizer.authorize(&method, request.headers()).await {
                    Ok(caller) => {
                        if let Some(caller) = caller {
                            debug!(account = %caller.account_id, "client successfully authorized");
                            request.extensions_mut().insert(caller);
                        }
                        inner.call(request).await
                    }
                    Err(err) => {
                        warn!(error = %err, "call rejected");
                        Ok(tonic::Status::from(err).into_http())
                    }
                }
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};
    use vault_crypto::TokenDeriver;
    use vault_store::{CredentialStore, LocalStore};

    async fn store_with_alice() -> (SharedStore, String) {
        let store = LocalStore::in_memory();
        let token = TokenDeriver::new("k").derive("s3cret").into_string();
        store.create_account("alice", &token).await.unwrap();
        (Arc::new(store), token)
    }

    fn headers(login: Option<&str>, token: Option<&str>) -> http::HeaderMap {
        let mut map = http::HeaderMap::new();
        if let Some(login) = login {
            map.insert(LOGIN_METADATA_KEY, login.parse().unwrap());
        }
        if let Some(token) = token {
            map.insert(TOKEN_METADATA_KEY, token.parse().unwrap());
        }
        map
    }

    #[tokio::test]
    async fn test_public_methods_need_no_metadata() {
        let (store, _) = store_with_alice().await;
        let authz = Authorizer::new(store);
        for method in PUBLIC_METHODS {
            assert!(authz
                .authorize(method, &headers(None, None))
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn test_valid_token_resolves_caller() {
        let (store, token) = store_with_alice().await;
        let expected = store.find_account_by_login("alice").await.unwrap().id;
        let authz = Authorizer::new(store);

        let caller = authz
            .authorize("/vault.Vault/GetText", &headers(Some("alice"), Some(&token)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(caller.account_id, expected);
        assert_eq!(caller.login, "alice");
        assert_eq!(caller.token.as_str(), token);
    }

    #[tokio::test]
    async fn test_rejections_are_unauthenticated() {
        let (store, token) = store_with_alice().await;
        let authz = Authorizer::new(store);
        let method = "/vault.Vault/GetLoginPassword";

        let cases = [
            headers(None, None),
            headers(Some("alice"), None),
            headers(None, Some(&token)),
            headers(Some("alice"), Some("")),
            headers(Some("alice"), Some("not-the-token")),
            headers(Some("mallory"), Some(&token)),
        ];
        for case in cases {
            let err = authz.authorize(method, &case).await.unwrap_err();
            assert_eq!(err.code(), tonic::Code::Unauthenticated, "{err}");
        }
    }

    #[tokio::test]
    async fn test_layer_attaches_caller_and_blocks_bad_calls() {
        let (store, token) = store_with_alice().await;
        let layer = AuthLayer::new(Arc::new(Authorizer::new(store)));

        let inner = service_fn(|req: http::Request<()>| async move {
            let login = req
                .extensions()
                .get::<Caller>()
                .map(|c| c.login.clone())
                .unwrap_or_else(|| "<anonymous>".into());
            Ok::<_, Infallible>(http::Response::new(login))
        });
        let svc = layer.layer(inner);

        let ok = http::Request::builder()
            .uri("/vault.Vault/GetText")
            .header(LOGIN_METADATA_KEY, "alice")
            .header(TOKEN_METADATA_KEY, token.as_str())
            .body(())
            .unwrap();
        let resp = svc.clone().oneshot(ok).await.unwrap();
        assert_eq!(resp.body(), "alice");

        let public = http::Request::builder()
            .uri("/vault.Vault/Register")
            .body(())
            .unwrap();
        let resp = svc.clone().oneshot(public).await.unwrap();
        assert_eq!(resp.body(), "<anonymous>");

        let bad = http::Request::builder()
            .uri("/vault.Vault/GetText")
            .header(LOGIN_METADATA_KEY, "alice")
            .header(TOKEN_METADATA_KEY, "forged")
            .body(())
            .unwrap();
        let resp = svc.oneshot(bad).await.unwrap();
        assert!(resp.body().is_empty());
        let status = tonic::Status::from_header_map(resp.headers()).unwrap();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }
}
