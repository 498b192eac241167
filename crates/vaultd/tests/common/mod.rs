#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use vault_client::VaultClient;
use vault_crypto::{CipherEnvelope, TokenDeriver};
use vault_store::LocalStore;
use vaultd::grpc::VaultService;

pub const TOKEN_SECRET: &str = "integration-secret";
pub const BLOCK_SIZE: usize = 64;

/// A vaultd instance on an ephemeral loopback port
pub struct TestServer {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    _dir: tempfile::TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();

        let store = LocalStore::open(&dir.path().join("credentials.json"))
            .await
            .unwrap();
        let service = VaultService::new(
            Arc::new(store),
            CipherEnvelope::from_key([42u8; 32]),
            TokenDeriver::new(TOKEN_SECRET),
            data_dir.clone(),
            BLOCK_SIZE,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(vaultd::grpc::serve(listener, None, service, async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            data_dir,
            _dir: dir,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn client(&self) -> VaultClient {
        VaultClient::connect(&self.endpoint(), None).await.unwrap()
    }

    /// Client with a freshly registered account
    pub async fn account(&self, login: &str, password: &str) -> VaultClient {
        let mut client = self.client().await;
        client.register(login, password).await.unwrap();
        client
    }

    pub fn backing_files(&self) -> Vec<PathBuf> {
        files_in(&self.data_dir)
    }

}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
