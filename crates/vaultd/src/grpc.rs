//! tonic gRPC service over TCP (optionally TLS)

use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};
use tracing::{error, info, Span};

use vault_core::proto::{
    vault_server::{Vault, VaultServer},
    *,
};
use vault_core::types::FileKind;
use vault_core::{VaultError, VaultResult};
use vault_crypto::{CipherEnvelope, TokenDeriver};
use vault_store::{SharedStore, UpsertMode};

use crate::auth::{AuthLayer, Authorizer, Caller};
use crate::login_password::{LoginPasswordFields, LoginPasswordRecords};
use crate::session::SessionAuthority;
use crate::transfer::{Chunk, TransferEngine};

/// Implementation of the Vault gRPC service
pub struct VaultService {
    sessions: SessionAuthority,
    login_passwords: LoginPasswordRecords,
    transfers: TransferEngine,
    authorizer: Arc<Authorizer>,
}

impl VaultService {
    pub fn new(
        store: SharedStore,
        envelope: CipherEnvelope,
        deriver: TokenDeriver,
        data_dir: impl Into<PathBuf>,
        block_size: usize,
    ) -> Self {
        let envelope = Arc::new(envelope);
        Self {
            sessions: SessionAuthority::new(store.clone(), deriver),
            login_passwords: LoginPasswordRecords::new(store.clone(), envelope.clone()),
            transfers: TransferEngine::new(store.clone(), envelope, data_dir, block_size),
            authorizer: Arc::new(Authorizer::new(store)),
        }
    }

    /// Layer that must wrap this service's routes
    pub fn auth_layer(&self) -> AuthLayer {
        AuthLayer::new(self.authorizer.clone())
    }
}

fn text_chunk(message: Result<Text, Status>) -> VaultResult<Chunk> {
    let message =
        message.map_err(|status| VaultError::internal("unable to receive text chunk", status))?;
    Ok(Chunk {
        key: message.key,
        data: hex::decode(&message.data)
            .map_err(|e| VaultError::internal("unable to decode text data", e))?,
        meta: hex::decode(&message.meta)
            .map_err(|e| VaultError::internal("unable to decode metadata", e))?,
    })
}

fn binary_chunk(message: Result<Binary, Status>) -> VaultResult<Chunk> {
    let message =
        message.map_err(|status| VaultError::internal("unable to receive binary chunk", status))?;
    Ok(Chunk {
        key: message.key,
        data: message.data,
        meta: hex::decode(&message.meta)
            .map_err(|e| VaultError::internal("unable to decode metadata", e))?,
    })
}

fn text_message(chunk: Chunk) -> Text {
    Text {
        key: chunk.key,
        data: hex::encode(chunk.data),
        meta: hex::encode(chunk.meta),
    }
}

fn binary_message(chunk: Chunk) -> Binary {
    Binary {
        key: chunk.key,
        data: chunk.data,
        meta: hex::encode(chunk.meta),
    }
}

/// Log a failed call and turn it into the status sent to the client.
///
/// Internal detail goes to the log only; the status carries the fixed
/// context message.
fn reject(err: VaultError) -> Status {
    match &err {
        VaultError::Internal { .. } => error!(error = %err, "request failed"),
        _ => info!(code = ?err.code(), error = %err, "request refused"),
    }
    Status::from(err)
}

/// Log the outcome of a unary call and wrap it for tonic.
fn respond<T>(result: VaultResult<T>) -> Result<Response<T>, Status> {
    match result {
        Ok(message) => {
            info!("request completed");
            Ok(Response::new(message))
        }
        Err(err) => Err(reject(err)),
    }
}

/// Outbound side of a download; failures after the first message are
/// logged in the span of the call that opened the stream.
fn outbound<M, F>(
    chunks: BoxStream<'static, VaultResult<Chunk>>,
    to_message: F,
) -> BoxStream<'static, Result<M, Status>>
where
    M: Send + 'static,
    F: Fn(Chunk) -> M + Send + 'static,
{
    let span = Span::current();
    chunks
        .map(move |chunk| match chunk {
            Ok(chunk) => Ok(to_message(chunk)),
            Err(err) => Err(span.in_scope(|| reject(err))),
        })
        .boxed()
}

impl VaultService {
    async fn upload_text(
        &self,
        request: Request<Streaming<Text>>,
        mode: UpsertMode,
    ) -> Result<Response<Empty>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let inbound = request.into_inner().map(text_chunk);
        let result = self
            .transfers
            .upload(&caller, FileKind::Text, mode, inbound)
            .await;
        respond(result.map(|()| Empty {}))
    }

    async fn upload_binary(
        &self,
        request: Request<Streaming<Binary>>,
        mode: UpsertMode,
    ) -> Result<Response<Empty>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let inbound = request.into_inner().map(binary_chunk);
        let result = self
            .transfers
            .upload(&caller, FileKind::Binary, mode, inbound)
            .await;
        respond(result.map(|()| Empty {}))
    }

    async fn delete_file(
        &self,
        request: Request<Key>,
        kind: FileKind,
    ) -> Result<Response<Empty>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let key = request.into_inner().key;
        let result = self.transfers.delete(&caller, kind, &key).await;
        respond(result.map(|()| Empty {}))
    }
}

#[tonic::async_trait]
impl Vault for VaultService {
    async fn register(&self, request: Request<UserData>) -> Result<Response<LoginResult>, Status> {
        let UserData { login, password } = request.into_inner();
        let result = self.sessions.register(&login, &password).await;
        respond(result.map(|token| LoginResult {
            token: token.into_string(),
        }))
    }

    async fn login(&self, request: Request<UserData>) -> Result<Response<LoginResult>, Status> {
        let UserData { login, password } = request.into_inner();
        let result = self.sessions.login(&login, &password).await;
        respond(result.map(|token| LoginResult {
            token: token.into_string(),
        }))
    }

    async fn get_login_password(
        &self,
        request: Request<Key>,
    ) -> Result<Response<LoginPassword>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let key = request.into_inner().key;
        let result = self.login_passwords.get(&caller, &key).await;
        respond(result.map(|fields| LoginPassword {
            key,
            login: fields.login,
            password: fields.password,
            meta: fields.meta,
        }))
    }

    async fn add_login_password(
        &self,
        request: Request<LoginPassword>,
    ) -> Result<Response<Empty>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let (key, fields) = split_login_password(request.into_inner());
        let result = self.login_passwords.add(&caller, &key, &fields).await;
        respond(result.map(|()| Empty {}))
    }

    async fn update_login_password(
        &self,
        request: Request<LoginPassword>,
    ) -> Result<Response<Empty>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let (key, fields) = split_login_password(request.into_inner());
        let result = self.login_passwords.update(&caller, &key, &fields).await;
        respond(result.map(|()| Empty {}))
    }

    async fn delete_login_password(
        &self,
        request: Request<Key>,
    ) -> Result<Response<Empty>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let key = request.into_inner().key;
        let result = self.login_passwords.delete(&caller, &key).await;
        respond(result.map(|()| Empty {}))
    }

    async fn add_text(&self, request: Request<Streaming<Text>>) -> Result<Response<Empty>, Status> {
        self.upload_text(request, UpsertMode::Create).await
    }

    type GetTextStream = BoxStream<'static, Result<Text, Status>>;

    async fn get_text(
        &self,
        request: Request<Key>,
    ) -> Result<Response<Self::GetTextStream>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let key = request.into_inner().key;
        let result = self.transfers.download(&caller, FileKind::Text, &key).await;
        respond(result.map(|chunks| outbound(chunks, text_message)))
    }

    async fn update_text(
        &self,
        request: Request<Streaming<Text>>,
    ) -> Result<Response<Empty>, Status> {
        self.upload_text(request, UpsertMode::Replace).await
    }

    async fn delete_text(&self, request: Request<Key>) -> Result<Response<Empty>, Status> {
        self.delete_file(request, FileKind::Text).await
    }

    async fn add_binary(
        &self,
        request: Request<Streaming<Binary>>,
    ) -> Result<Response<Empty>, Status> {
        self.upload_binary(request, UpsertMode::Create).await
    }

    type GetBinaryStream = BoxStream<'static, Result<Binary, Status>>;

    async fn get_binary(
        &self,
        request: Request<Key>,
    ) -> Result<Response<Self::GetBinaryStream>, Status> {
        let caller = Caller::from_request(&request).map_err(reject)?;
        let key = request.into_inner().key;
        let result = self
            .transfers
            .download(&caller, FileKind::Binary, &key)
            .await;
        respond(result.map(|chunks| outbound(chunks, binary_message)))
    }

    async fn update_binary(
        &self,
        request: Request<Streaming<Binary>>,
    ) -> Result<Response<Empty>, Status> {
        self.upload_binary(request, UpsertMode::Replace).await
    }

    async fn delete_binary(&self, request: Request<Key>) -> Result<Response<Empty>, Status> {
        self.delete_file(request, FileKind::Binary).await
    }
}

fn split_login_password(message: LoginPassword) -> (String, LoginPasswordFields) {
    (
        message.key,
        LoginPasswordFields {
            login: message.login,
            password: message.password,
            meta: message.meta,
        },
    )
}

/// Serve the vault on an already-bound TCP listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    tls: Option<ServerTlsConfig>,
    service: VaultService,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let mut builder = Server::builder();
    if let Some(tls) = tls {
        builder = builder
            .tls_config(tls)
            .map_err(|e| anyhow::anyhow!("invalid TLS configuration: {e}"))?;
    }

    info!(%addr, "gRPC server ready");

    builder
        .layer(service.auth_layer())
        .add_service(VaultServer::new(service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("gRPC server error: {e}"))
}
