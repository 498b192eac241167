//! Daemon lifecycle: startup checks, store, TLS identity, gRPC server, shutdown

use anyhow::{Context, Result};
use rand::RngCore;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tonic::transport::{Identity, ServerTlsConfig};
use tracing::{info, warn};

use vault_core::config::{ServerConfig, VaultConfig};
use vault_crypto::{CipherEnvelope, TokenDeriver, KEY_SIZE};
use vault_store::LocalStore;

use crate::grpc::VaultService;

pub async fn run(config: VaultConfig) -> Result<()> {
    info!("daemon starting");

    let envelope = CipherEnvelope::from_key_file(&config.crypto.cipher_key_file);
    envelope.check().with_context(|| {
        format!(
            "loading cipher key {} (create one with `vaultd gen-key`)",
            config.crypto.cipher_key_file.display()
        )
    })?;
    info!(key_file = %config.crypto.cipher_key_file.display(), "cipher key loaded");

    tokio::fs::create_dir_all(&config.storage.data_dir)
        .await
        .with_context(|| format!("creating data dir {}", config.storage.data_dir.display()))?;

    let store = LocalStore::open(&config.storage.credential_db)
        .await
        .map_err(|e| anyhow::anyhow!("opening credential store: {e}"))?;
    info!(
        path = %config.storage.credential_db.display(),
        accounts = store.account_count().await,
        "credential store opened"
    );

    let deriver = match &config.auth.token_secret {
        Some(secret) if !secret.is_empty() => TokenDeriver::new(secret.clone()),
        _ => {
            warn!(
                "auth.token_secret is not set; deriving session tokens with the built-in legacy secret. \
                 Set auth.token_secret or VAULT_TOKEN_SECRET in production."
            );
            TokenDeriver::legacy()
        }
    };

    let tls = load_tls(&config.server)?;

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;

    let service = VaultService::new(
        Arc::new(store),
        envelope,
        deriver,
        config.storage.data_dir.clone(),
        config.crypto.block_size,
    );

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    };

    notify_ready();

    crate::grpc::serve(listener, tls, service, shutdown).await?;

    info!("daemon stopped");
    Ok(())
}

/// Build the server TLS identity from PEM files.
///
/// If `enforce_tls` is set and no identity is configured, startup fails.
/// Otherwise a plaintext listener is allowed with a warning.
pub fn load_tls(server: &ServerConfig) -> Result<Option<ServerTlsConfig>> {
    match (&server.tls_cert, &server.tls_key) {
        (Some(cert), Some(key)) => {
            let cert_pem = std::fs::read(cert)
                .with_context(|| format!("reading TLS certificate {}", cert.display()))?;
            let key_pem = std::fs::read(key)
                .with_context(|| format!("reading TLS key {}", key.display()))?;
            info!(cert = %cert.display(), "TLS enabled");
            Ok(Some(
                ServerTlsConfig::new().identity(Identity::from_pem(cert_pem, key_pem)),
            ))
        }
        (None, None) => {
            if server.enforce_tls {
                anyhow::bail!(
                    "no TLS identity configured, but enforce_tls is enabled. \
                     Set server.tls_cert and server.tls_key, or server.enforce_tls = false for local development."
                );
            }
            warn!(
                listen = %server.listen,
                "serving without TLS; session tokens are transmitted unencrypted. \
                 Configure server.tls_cert/tls_key and server.enforce_tls = true in production."
            );
            Ok(None)
        }
        _ => anyhow::bail!("server.tls_cert and server.tls_key must be set together"),
    }
}

/// Write a fresh random cipher key readable only by the owner.
///
/// Refuses to overwrite an existing file: replacing the key makes every
/// stored record unreadable.
pub fn generate_key_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut key = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("creating key file {}", path.display()))?;
    file.write_all(&key)?;
    file.sync_all()?;
    key.fill(0);

    info!(path = %path.display(), "cipher key generated");
    Ok(())
}

fn notify_ready() {
    // sd_notify(READY=1) when running under systemd; no-op otherwise
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_generate_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("cipher.key");

        generate_key_file(&path).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.len(), KEY_SIZE as u64);
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        CipherEnvelope::from_key_file(&path).check().unwrap();
    }

    #[test]
    fn test_generate_key_file_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cipher.key");
        generate_key_file(&path).unwrap();
        let original = std::fs::read(&path).unwrap();

        assert!(generate_key_file(&path).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[test]
    fn test_plaintext_allowed_without_enforcement() {
        let server = ServerConfig::default();
        assert!(load_tls(&server).unwrap().is_none());
    }

    #[test]
    fn test_enforce_tls_requires_identity() {
        let server = ServerConfig {
            enforce_tls: true,
            ..Default::default()
        };
        let err = load_tls(&server).unwrap_err();
        assert!(err.to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_half_configured_tls_rejected() {
        let server = ServerConfig {
            tls_cert: Some("/etc/vault/server.crt".into()),
            ..Default::default()
        };
        assert!(load_tls(&server).is_err());
    }

    #[test]
    fn test_missing_tls_files_reported() {
        let dir = tempfile::tempdir().unwrap();
        let server = ServerConfig {
            tls_cert: Some(dir.path().join("missing.crt")),
            tls_key: Some(dir.path().join("missing.key")),
            ..Default::default()
        };
        let err = load_tls(&server).unwrap_err();
        assert!(err.to_string().contains("missing.crt"));
    }
}
