//! vault: command-line client for vaultd
//!
//! Usage:
//!   vault --user alice register
//!   vault --user alice login
//!   vault --user alice login-password add --key mail --login alice@example.com
//!   vault --user alice text get --key notes --out notes.txt

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

use vault_client::{validate, CardRecord, ClientError, LoginPasswordRecord, Secret, VaultClient};
use vault_core::types::{RecordKind, SessionToken};

#[derive(Parser, Debug)]
#[command(name = "vault", version, about = "Secrets vault command-line client")]
struct Cli {
    /// Server endpoint
    #[arg(
        long,
        short = 'a',
        env = "VAULT_SERVER",
        default_value = "http://127.0.0.1:8400"
    )]
    server: String,

    /// PEM CA certificate used to verify the server
    #[arg(long, env = "VAULT_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Account login
    #[arg(long, short = 'u', env = "VAULT_USER")]
    user: Option<String>,

    /// Account password (prompted when absent)
    #[arg(long, env = "VAULT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Session token printed by `vault login`; skips the password
    #[arg(long, env = "VAULT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VAULT_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an account and print its session token
    Register,
    /// Log in and print the session token
    Login,
    /// Login/password records
    #[command(name = "login-password")]
    LoginPassword {
        #[command(subcommand)]
        action: LoginPasswordAction,
    },
    /// Text records, streamed from and to local files
    Text {
        #[command(subcommand)]
        action: FileAction,
    },
    /// Binary records, streamed from and to local files
    Binary {
        #[command(subcommand)]
        action: FileAction,
    },
    /// Payment card records (validated locally; not stored by the server)
    Card {
        #[command(subcommand)]
        action: CardAction,
    },
}

#[derive(Subcommand, Debug)]
enum LoginPasswordAction {
    Add(LoginPasswordArgs),
    Update(LoginPasswordArgs),
    Get(KeyArg),
    Delete(KeyArg),
}

#[derive(Args, Debug)]
struct KeyArg {
    #[arg(long, short = 'k')]
    key: String,
}

#[derive(Args, Debug)]
struct LoginPasswordArgs {
    #[arg(long, short = 'k')]
    key: String,
    /// Stored login
    #[arg(long)]
    login: String,
    /// Stored password (prompted when absent)
    #[arg(long = "secret", env = "VAULT_RECORD_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, default_value = "")]
    meta: String,
}

#[derive(Subcommand, Debug)]
enum FileAction {
    Add(FileArgs),
    Update(FileArgs),
    Get {
        #[arg(long, short = 'k')]
        key: String,
        /// Destination file (default: <kind>_<key>.<ext> in the current directory)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },
    Delete(KeyArg),
}

#[derive(Args, Debug)]
struct FileArgs {
    #[arg(long, short = 'k')]
    key: String,
    /// Local file to upload
    #[arg(long, short = 'f')]
    file: PathBuf,
    #[arg(long, default_value = "")]
    meta: String,
}

#[derive(Subcommand, Debug)]
enum CardAction {
    Add(CardArgs),
    Update(CardArgs),
    Get(KeyArg),
    Delete(KeyArg),
}

#[derive(Args, Debug)]
struct CardArgs {
    #[arg(long, short = 'k')]
    key: String,
    #[arg(long)]
    number: String,
    /// MM/YY
    #[arg(long)]
    expiration: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    surname: String,
    #[arg(long)]
    cvv: String,
    #[arg(long, default_value = "")]
    meta: String,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match &cli.command {
        Commands::Register => cmd_register(&cli).await,
        Commands::Login => cmd_login(&cli).await,
        Commands::LoginPassword { action } => cmd_login_password(&cli, action).await,
        Commands::Text { action } => cmd_file(&cli, RecordKind::Text, action).await,
        Commands::Binary { action } => cmd_file(&cli, RecordKind::Binary, action).await,
        Commands::Card { action } => cmd_card(action),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Session ───────────────────────────────────────────────────────────────────

async fn connect(cli: &Cli) -> Result<VaultClient> {
    VaultClient::connect(&cli.server, cli.ca_cert.as_deref())
        .await
        .with_context(|| format!("connecting to {}", cli.server))
}

fn account_login(cli: &Cli) -> Result<&str> {
    cli.user
        .as_deref()
        .context("account login required: pass --user or set VAULT_USER")
}

fn account_password(cli: &Cli) -> Result<String> {
    match &cli.password {
        Some(password) => Ok(password.clone()),
        None => rpassword::prompt_password("Password: ").context("reading password"),
    }
}

/// Connected client with a session: reuse `--token` or log in.
async fn session(cli: &Cli) -> Result<VaultClient> {
    let login = account_login(cli)?;
    let mut client = connect(cli).await?;
    match &cli.token {
        Some(token) => client.set_session(login, SessionToken::new(token.clone())),
        None => {
            let password = account_password(cli)?;
            client.login(login, &password).await?;
        }
    }
    debug!(login, "session ready");
    Ok(client)
}

async fn cmd_register(cli: &Cli) -> Result<()> {
    let login = account_login(cli)?;
    let password = account_password(cli)?;
    validate::login(login)?;
    validate::password(&password)?;

    let mut client = connect(cli).await?;
    let token = client.register(login, &password).await?;
    println!("{}", token.as_str());
    Ok(())
}

async fn cmd_login(cli: &Cli) -> Result<()> {
    let login = account_login(cli)?;
    let password = account_password(cli)?;

    let mut client = connect(cli).await?;
    let token = client.login(login, &password).await?;
    println!("{}", token.as_str());
    Ok(())
}

// ── Records ───────────────────────────────────────────────────────────────────

async fn cmd_login_password(cli: &Cli, action: &LoginPasswordAction) -> Result<()> {
    match action {
        LoginPasswordAction::Add(args) | LoginPasswordAction::Update(args) => {
            let password = match &args.password {
                Some(password) => password.clone(),
                None => rpassword::prompt_password("Stored password: ")
                    .context("reading stored password")?,
            };
            let secret = Secret::LoginPassword {
                key: args.key.clone(),
                record: LoginPasswordRecord {
                    login: args.login.clone(),
                    password,
                    meta: args.meta.clone(),
                },
            };
            secret.validate()?;

            let mut client = session(cli).await?;
            if matches!(action, LoginPasswordAction::Update(_)) {
                client.update(&secret).await?;
            } else {
                client.add(&secret).await?;
            }
            println!("saved {}", args.key);
        }
        LoginPasswordAction::Get(KeyArg { key }) => {
            validate::record_key(key)?;
            let record = session(cli).await?.get_login_password(key).await?;
            println!("login:    {}", record.login);
            println!("password: {}", record.password);
            println!("meta:     {}", record.meta);
        }
        LoginPasswordAction::Delete(KeyArg { key }) => {
            validate::record_key(key)?;
            session(cli)
                .await?
                .delete(RecordKind::LoginPassword, key)
                .await?;
            println!("deleted {key}");
        }
    }
    Ok(())
}

async fn cmd_file(cli: &Cli, kind: RecordKind, action: &FileAction) -> Result<()> {
    match action {
        FileAction::Add(args) | FileAction::Update(args) => {
            let secret = match kind {
                RecordKind::Binary => Secret::Binary {
                    key: args.key.clone(),
                    path: args.file.clone(),
                    meta: args.meta.clone(),
                },
                _ => Secret::Text {
                    key: args.key.clone(),
                    path: args.file.clone(),
                    meta: args.meta.clone(),
                },
            };
            secret.validate()?;

            let mut client = session(cli).await?;
            if matches!(action, FileAction::Update(_)) {
                client.update(&secret).await?;
            } else {
                client.add(&secret).await?;
            }
            println!("saved {}", args.key);
        }
        FileAction::Get { key, out } => {
            validate::record_key(key)?;
            let out = out.clone().unwrap_or_else(|| default_download_path(kind, key));
            let mut client = session(cli).await?;
            let meta = download(&mut client, kind, key, &out).await?;
            println!("wrote {}", out.display());
            println!("meta: {meta}");
        }
        FileAction::Delete(KeyArg { key }) => {
            validate::record_key(key)?;
            session(cli).await?.delete(kind, key).await?;
            println!("deleted {key}");
        }
    }
    Ok(())
}

fn default_download_path(kind: RecordKind, key: &str) -> PathBuf {
    let ext = if kind == RecordKind::Binary { "bin" } else { "txt" };
    PathBuf::from(format!("{kind}_{key}.{ext}"))
}

/// Download into `out`, removing the partial file if the stream fails.
async fn download(
    client: &mut VaultClient,
    kind: RecordKind,
    key: &str,
    out: &Path,
) -> Result<String> {
    let mut file = tokio::fs::File::create(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;
    let result = if kind == RecordKind::Binary {
        client.get_binary(key, &mut file).await
    } else {
        client.get_text(key, &mut file).await
    };
    match result {
        Ok(meta) => Ok(meta),
        Err(e) => {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(out).await {
                debug!("failed to remove {}: {rm}", out.display());
            }
            Err(e.into())
        }
    }
}

/// Cards are checked locally; the server has no storage for them yet.
fn cmd_card(action: &CardAction) -> Result<()> {
    match action {
        CardAction::Add(args) | CardAction::Update(args) => {
            Secret::Card {
                key: args.key.clone(),
                card: CardRecord {
                    number: args.number.clone(),
                    expiration: args.expiration.clone(),
                    name: args.name.clone(),
                    surname: args.surname.clone(),
                    cvv: args.cvv.clone(),
                    meta: args.meta.clone(),
                },
            }
            .validate()?;
        }
        CardAction::Get(KeyArg { key }) | CardAction::Delete(KeyArg { key }) => {
            validate::record_key(key)?;
        }
    }
    Err(ClientError::Unsupported(RecordKind::Card).into())
}
