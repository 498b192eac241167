//! vault-client: talk to a vaultd server
//!
//! ```no_run
//! # async fn demo() -> vault_client::ClientResult<()> {
//! use vault_client::{LoginPasswordRecord, VaultClient};
//!
//! let mut client = VaultClient::connect("http://127.0.0.1:8400", None).await?;
//! client.login("alice", "s3cret").await?;
//! client
//!     .add_login_password(
//!         "mail",
//!         &LoginPasswordRecord {
//!             login: "alice@example.com".into(),
//!             password: "hunter22".into(),
//!             meta: String::new(),
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod record;
pub mod validate;

pub use client::{SessionInterceptor, VaultClient, CHUNK_SIZE};
pub use error::{ClientError, ClientResult};
pub use record::{CardRecord, LoginPasswordRecord, Secret};
