//! gRPC client with session handling and streamed payloads.

use futures::stream::{self, Stream};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tonic::metadata::MetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status};
use tracing::debug;

use vault_core::proto::vault_client::VaultClient as GrpcClient;
use vault_core::proto::{Binary, Empty, Key, LoginPassword, Text, UserData};
use vault_core::types::{FileKind, Persistence, RecordKind, SessionToken};
use vault_core::{LOGIN_METADATA_KEY, TOKEN_METADATA_KEY};

use crate::error::{ClientError, ClientResult};
use crate::record::{LoginPasswordRecord, Secret};

/// Plaintext bytes per upload message
pub const CHUNK_SIZE: usize = 1000;

struct Session {
    login: String,
    token: SecretString,
}

type SharedSession = Arc<RwLock<Option<Session>>>;

/// Attaches `account-login` and `session-token` to every outgoing call once
/// a session exists.
#[derive(Clone, Default)]
pub struct SessionInterceptor {
    session: SharedSession,
}

impl Interceptor for SessionInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = guard.as_ref() {
            let login = MetadataValue::try_from(session.login.as_str())
                .map_err(|_| Status::invalid_argument("login cannot be sent as call metadata"))?;
            let token = MetadataValue::try_from(session.token.expose_secret())
                .map_err(|_| Status::invalid_argument("token cannot be sent as call metadata"))?;
            request.metadata_mut().insert(LOGIN_METADATA_KEY, login);
            request.metadata_mut().insert(TOKEN_METADATA_KEY, token);
        }
        Ok(request)
    }
}

pub struct VaultClient {
    inner: GrpcClient<InterceptedService<Channel, SessionInterceptor>>,
    session: SharedSession,
}

impl VaultClient {
    /// Connect to `endpoint` (e.g. `https://vault.example:8400`).
    ///
    /// With `ca_cert` the server certificate is verified against that PEM
    /// bundle; an `https` endpoint without one uses the webpki roots.
    pub async fn connect(endpoint: &str, ca_cert: Option<&Path>) -> ClientResult<Self> {
        let mut builder = Endpoint::from_shared(endpoint.to_string())?;
        if let Some(ca_cert) = ca_cert {
            let pem = tokio::fs::read(ca_cert).await?;
            builder = builder
                .tls_config(ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem)))?;
        } else if endpoint.starts_with("https://") {
            builder = builder.tls_config(ClientTlsConfig::new().with_webpki_roots())?;
        }
        let channel = builder.connect().await?;
        debug!(endpoint, "connected");
        Ok(Self::from_channel(channel))
    }

    pub fn from_channel(channel: Channel) -> Self {
        let interceptor = SessionInterceptor::default();
        let session = interceptor.session.clone();
        Self {
            inner: GrpcClient::with_interceptor(channel, interceptor),
            session,
        }
    }

    /// Reuse a token obtained earlier instead of logging in again.
    pub fn set_session(&self, login: impl Into<String>, token: SessionToken) {
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Session {
            login: login.into(),
            token: SecretString::from(token.into_string()),
        });
    }

    pub fn logged_in_as(&self) -> Option<String> {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|s| s.login.clone())
    }

    // ── Session ──────────────────────────────────────────────────────────

    pub async fn register(&mut self, login: &str, password: &str) -> ClientResult<SessionToken> {
        let token = self
            .inner
            .register(user_data(login, password))
            .await?
            .into_inner()
            .token;
        let token = SessionToken::new(token);
        self.set_session(login, token.clone());
        Ok(token)
    }

    pub async fn login(&mut self, login: &str, password: &str) -> ClientResult<SessionToken> {
        let token = self
            .inner
            .login(user_data(login, password))
            .await?
            .into_inner()
            .token;
        let token = SessionToken::new(token);
        self.set_session(login, token.clone());
        Ok(token)
    }

    // ── Login/password records ───────────────────────────────────────────

    pub async fn add_login_password(
        &mut self,
        key: &str,
        record: &LoginPasswordRecord,
    ) -> ClientResult<()> {
        self.inner
            .add_login_password(login_password(key, record))
            .await?;
        Ok(())
    }

    pub async fn update_login_password(
        &mut self,
        key: &str,
        record: &LoginPasswordRecord,
    ) -> ClientResult<()> {
        self.inner
            .update_login_password(login_password(key, record))
            .await?;
        Ok(())
    }

    pub async fn get_login_password(&mut self, key: &str) -> ClientResult<LoginPasswordRecord> {
        let message = self
            .inner
            .get_login_password(Key { key: key.into() })
            .await?
            .into_inner();
        Ok(LoginPasswordRecord {
            login: message.login,
            password: message.password,
            meta: message.meta,
        })
    }

    pub async fn delete_login_password(&mut self, key: &str) -> ClientResult<()> {
        self.inner
            .delete_login_password(Key { key: key.into() })
            .await?;
        Ok(())
    }

    // ── Text records ─────────────────────────────────────────────────────

    pub async fn add_text<R>(&mut self, key: &str, meta: &str, reader: R) -> ClientResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let (tx, rx) = mpsc::channel(8);
        let pump = send_chunks(reader, tx, text_frame(key, meta));
        drive(pump, self.inner.add_text(request_stream(rx))).await
    }

    pub async fn update_text<R>(&mut self, key: &str, meta: &str, reader: R) -> ClientResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let (tx, rx) = mpsc::channel(8);
        let pump = send_chunks(reader, tx, text_frame(key, meta));
        drive(pump, self.inner.update_text(request_stream(rx))).await
    }

    /// Stream a text record into `writer`; returns its metadata.
    pub async fn get_text<W>(&mut self, key: &str, writer: &mut W) -> ClientResult<String>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self
            .inner
            .get_text(Key { key: key.into() })
            .await?
            .into_inner();
        let mut meta = None;
        while let Some(message) = stream.message().await? {
            let data = hex::decode(&message.data)
                .map_err(|e| ClientError::Malformed(format!("text chunk: {e}")))?;
            writer.write_all(&data).await?;
            meta.get_or_insert(message.meta);
        }
        writer.flush().await?;
        decode_meta(meta)
    }

    pub async fn delete_text(&mut self, key: &str) -> ClientResult<()> {
        self.inner.delete_text(Key { key: key.into() }).await?;
        Ok(())
    }

    // ── Binary records ───────────────────────────────────────────────────

    pub async fn add_binary<R>(&mut self, key: &str, meta: &str, reader: R) -> ClientResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let (tx, rx) = mpsc::channel(8);
        let pump = send_chunks(reader, tx, binary_frame(key, meta));
        drive(pump, self.inner.add_binary(request_stream(rx))).await
    }

    pub async fn update_binary<R>(&mut self, key: &str, meta: &str, reader: R) -> ClientResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let (tx, rx) = mpsc::channel(8);
        let pump = send_chunks(reader, tx, binary_frame(key, meta));
        drive(pump, self.inner.update_binary(request_stream(rx))).await
    }

    pub async fn get_binary<W>(&mut self, key: &str, writer: &mut W) -> ClientResult<String>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self
            .inner
            .get_binary(Key { key: key.into() })
            .await?
            .into_inner();
        let mut meta = None;
        while let Some(message) = stream.message().await? {
            writer.write_all(&message.data).await?;
            meta.get_or_insert(message.meta);
        }
        writer.flush().await?;
        decode_meta(meta)
    }

    pub async fn delete_binary(&mut self, key: &str) -> ClientResult<()> {
        self.inner.delete_binary(Key { key: key.into() }).await?;
        Ok(())
    }

    // ── Kind dispatch ────────────────────────────────────────────────────

    /// Store a new secret.
    pub async fn add(&mut self, secret: &Secret) -> ClientResult<()> {
        self.put(secret, false).await
    }

    /// Replace an existing secret.
    pub async fn update(&mut self, secret: &Secret) -> ClientResult<()> {
        self.put(secret, true).await
    }

    async fn put(&mut self, secret: &Secret, replace: bool) -> ClientResult<()> {
        match secret {
            Secret::LoginPassword { key, record } if replace => {
                self.update_login_password(key, record).await
            }
            Secret::LoginPassword { key, record } => self.add_login_password(key, record).await,
            Secret::Text { key, path, meta } => {
                let file = tokio::fs::File::open(path).await?;
                if replace {
                    self.update_text(key, meta, file).await
                } else {
                    self.add_text(key, meta, file).await
                }
            }
            Secret::Binary { key, path, meta } => {
                let file = tokio::fs::File::open(path).await?;
                if replace {
                    self.update_binary(key, meta, file).await
                } else {
                    self.add_binary(key, meta, file).await
                }
            }
            Secret::Card { .. } => Err(ClientError::Unsupported(RecordKind::Card)),
        }
    }

    pub async fn delete(&mut self, kind: RecordKind, key: &str) -> ClientResult<()> {
        match kind.persistence() {
            Persistence::Inline => self.delete_login_password(key).await,
            Persistence::File(FileKind::Text) => self.delete_text(key).await,
            Persistence::File(FileKind::Binary) => self.delete_binary(key).await,
            Persistence::ClientOnly => Err(ClientError::Unsupported(kind)),
        }
    }
}

fn user_data(login: &str, password: &str) -> UserData {
    UserData {
        login: login.into(),
        password: password.into(),
    }
}

fn login_password(key: &str, record: &LoginPasswordRecord) -> LoginPassword {
    LoginPassword {
        key: key.into(),
        login: record.login.clone(),
        password: record.password.clone(),
        meta: record.meta.clone(),
    }
}

fn text_frame(key: &str, meta: &str) -> impl Fn(Vec<u8>) -> Text {
    let key = key.to_string();
    let meta = hex::encode(meta);
    move |data| Text {
        key: key.clone(),
        data: hex::encode(data),
        meta: meta.clone(),
    }
}

fn binary_frame(key: &str, meta: &str) -> impl Fn(Vec<u8>) -> Binary {
    let key = key.to_string();
    let meta = hex::encode(meta);
    move |data| Binary {
        key: key.clone(),
        data,
        meta: meta.clone(),
    }
}

#[derive(Debug)]
enum Upload<M> {
    Chunk(M),
    Finish,
}

/// Outbound request stream that ends only on an explicit [`Upload::Finish`].
///
/// If the sender goes away first (local read error, caller dropped the
/// upload) the stream stays open rather than ending, so the server never
/// commits a truncated payload. It rolls back once the call or connection
/// is torn down.
fn request_stream<M: Send + 'static>(
    rx: mpsc::Receiver<Upload<M>>,
) -> impl Stream<Item = M> + Send + 'static {
    stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Some(Upload::Chunk(message)) => Some((message, rx)),
            Some(Upload::Finish) => None,
            None => std::future::pending().await,
        }
    })
}

/// Read `reader` in [`CHUNK_SIZE`] pieces into `tx`, then mark the end.
///
/// At least one message is always sent so an empty payload still carries
/// the key and metadata.
async fn send_chunks<R, M, F>(
    mut reader: R,
    tx: mpsc::Sender<Upload<M>>,
    frame: F,
) -> ClientResult<()>
where
    R: AsyncRead + Unpin,
    F: Fn(Vec<u8>) -> M,
{
    let mut sent = false;
    loop {
        let mut data = Vec::with_capacity(CHUNK_SIZE);
        (&mut reader)
            .take(CHUNK_SIZE as u64)
            .read_to_end(&mut data)
            .await?;
        let last = data.len() < CHUNK_SIZE;
        if data.is_empty() && sent {
            break;
        }
        if tx.send(Upload::Chunk(frame(data))).await.is_err() {
            // Call already finished; its response carries the outcome.
            return Ok(());
        }
        sent = true;
        if last {
            break;
        }
    }
    let _ = tx.send(Upload::Finish).await;
    Ok(())
}

/// Run the chunk pump alongside the client-streaming call.
///
/// A local read error drops the in-flight call, which cancels the stream on
/// the server and rolls the upload back.
async fn drive<P, C>(pump: P, call: C) -> ClientResult<()>
where
    P: Future<Output = ClientResult<()>>,
    C: Future<Output = Result<tonic::Response<Empty>, Status>>,
{
    let mut call = std::pin::pin!(call);
    let pump = std::pin::pin!(pump);
    tokio::select! {
        pumped = pump => pumped?,
        response = &mut call => {
            response?;
            return Ok(());
        }
    }
    call.await?;
    Ok(())
}

fn decode_meta(meta: Option<String>) -> ClientResult<String> {
    let bytes = hex::decode(meta.unwrap_or_default())
        .map_err(|e| ClientError::Malformed(format!("metadata: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ClientError::Malformed(format!("metadata: {e}")))
}
