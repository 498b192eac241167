//! Client-side record shapes.
//!
//! [`Secret`] is the closed set of things a user can store. Each variant maps
//! to exactly one server path through [`RecordKind::persistence`].

use std::path::PathBuf;

use vault_core::types::RecordKind;

use crate::error::ClientResult;
use crate::validate;

/// Login/password pair as the user sees it
#[derive(Clone, PartialEq, Eq)]
pub struct LoginPasswordRecord {
    pub login: String,
    pub password: String,
    pub meta: String,
}

impl std::fmt::Debug for LoginPasswordRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginPasswordRecord")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("meta", &self.meta)
            .finish()
    }
}

/// Payment card; validated locally, not persisted by the server
#[derive(Clone, PartialEq, Eq)]
pub struct CardRecord {
    pub number: String,
    pub expiration: String,
    pub name: String,
    pub surname: String,
    pub cvv: String,
    pub meta: String,
}

impl std::fmt::Debug for CardRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardRecord")
            .field("number", &"[REDACTED]")
            .field("name", &self.name)
            .field("surname", &self.surname)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Secret {
    LoginPassword {
        key: String,
        record: LoginPasswordRecord,
    },
    /// Text payload read from a local file
    Text {
        key: String,
        path: PathBuf,
        meta: String,
    },
    /// Binary payload read from a local file
    Binary {
        key: String,
        path: PathBuf,
        meta: String,
    },
    Card {
        key: String,
        card: CardRecord,
    },
}

impl Secret {
    pub fn kind(&self) -> RecordKind {
        match self {
            Secret::LoginPassword { .. } => RecordKind::LoginPassword,
            Secret::Text { .. } => RecordKind::Text,
            Secret::Binary { .. } => RecordKind::Binary,
            Secret::Card { .. } => RecordKind::Card,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Secret::LoginPassword { key, .. }
            | Secret::Text { key, .. }
            | Secret::Binary { key, .. }
            | Secret::Card { key, .. } => key,
        }
    }

    /// Apply the input rules for this kind.
    pub fn validate(&self) -> ClientResult<()> {
        validate::record_key(self.key())?;
        match self {
            Secret::LoginPassword { record, .. } => {
                validate::login(&record.login)?;
                validate::password(&record.password)
            }
            Secret::Text { path, .. } | Secret::Binary { path, .. } => {
                if !path.is_file() {
                    return Err(crate::error::ClientError::invalid(
                        "file",
                        format!("{} does not exist", path.display()),
                    ));
                }
                Ok(())
            }
            Secret::Card { card, .. } => {
                validate::card_number(&card.number)?;
                validate::card_expiration(&card.expiration)?;
                validate::non_empty("name", &card.name)?;
                validate::non_empty("surname", &card.surname)?;
                validate::card_cvv(&card.cvv)
            }
        }
    }
}
