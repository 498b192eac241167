//! vaultd: secrets vault daemon
//!
//! Usage:
//!   vaultd [--config /etc/vault/vaultd.toml] [serve]
//!   vaultd gen-key --out /etc/vault/cipher.key

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use vault_core::config::VaultConfig;
use vaultd::daemon;

#[derive(Parser, Debug)]
#[command(name = "vaultd", version, about = "Secrets vault daemon")]
struct Cli {
    /// Path to vaultd.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "VAULT_CONFIG",
        default_value = "/etc/vault/vaultd.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides server.log_level
    #[arg(long, env = "VAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides server.log_format
    #[arg(long, env = "VAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Listen address; overrides server.listen
    #[arg(long, env = "VAULT_LISTEN")]
    listen: Option<String>,

    /// HMAC secret for session tokens; overrides auth.token_secret
    #[arg(long, env = "VAULT_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gRPC server (default)
    Serve,
    /// Generate a new random cipher key file
    GenKey {
        /// Destination path; must not exist
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::GenKey { out }) = &cli.command {
        init_logging(cli.log.as_deref().unwrap_or("info"), &LogFormat::Text);
        return daemon::generate_key_file(out);
    }

    let (mut config, found) = load_config(&cli.config).await?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(secret) = cli.token_secret {
        config.auth.token_secret = Some(secret);
    }

    let level = cli.log.unwrap_or_else(|| config.server.log_level.clone());
    let format = cli.log_format.unwrap_or_else(|| {
        if config.server.log_format == "text" {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    });
    init_logging(&level, &format);

    if !found {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        listen = %config.server.listen,
        "vaultd starting"
    );

    daemon::run(config).await
}

/// Returns the parsed config and whether the file existed.
async fn load_config(path: &Path) -> Result<(VaultConfig, bool)> {
    if !path.exists() {
        return Ok((VaultConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
    let config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;
    Ok((config, true))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
