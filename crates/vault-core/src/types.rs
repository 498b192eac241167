use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque account identifier assigned by the credential store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(uuid::Uuid);

impl AccountId {
    pub fn new_random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// Session token presented on every authenticated call.
///
/// Equal to the account's password verifier, so it is as sensitive as the
/// password itself. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token bytes, used as the nonce source for the cipher envelope
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&"[REDACTED]").finish()
    }
}

/// A registered account as seen by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub login: String,
    /// hex(HMAC-SHA256(server secret, password)); identical to the session token
    pub password_verifier: String,
}

/// Where a record kind's payload lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Fields encrypted individually and stored hex-encoded in the credential store
    Inline,
    /// Payload streamed into an encrypted backing file
    File(FileKind),
    /// Kept on the client only; the server has no storage for it
    ClientOnly,
}

/// The closed set of record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    LoginPassword,
    Text,
    Binary,
    Card,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::LoginPassword,
        RecordKind::Text,
        RecordKind::Binary,
        RecordKind::Card,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::LoginPassword => "login_pass",
            RecordKind::Text => "text",
            RecordKind::Binary => "binary",
            RecordKind::Card => "card",
        }
    }

    pub fn persistence(self) -> Persistence {
        match self {
            RecordKind::LoginPassword => Persistence::Inline,
            RecordKind::Text => Persistence::File(FileKind::Text),
            RecordKind::Binary => Persistence::File(FileKind::Binary),
            RecordKind::Card => Persistence::ClientOnly,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown record kind: {s}"))
    }
}

/// Record kinds whose payload is streamed into a backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Text,
    Binary,
}

impl FileKind {
    pub fn record_kind(self) -> RecordKind {
        match self {
            FileKind::Text => RecordKind::Text,
            FileKind::Binary => RecordKind::Binary,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            FileKind::Text => "txt",
            FileKind::Binary => "bin",
        }
    }

    /// Backing file name for a record: `{kind}_{account}_{hex(key)}.{ext}`.
    ///
    /// Stable for the lifetime of the record. The key is hex-encoded so a
    /// client-chosen key can never name a path outside the data directory.
    pub fn backing_file_name(self, account: &AccountId, record_key: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            self.record_kind().as_str(),
            account,
            hex::encode(record_key.as_bytes()),
            self.extension()
        )
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.record_kind().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_persistence() {
        assert_eq!(RecordKind::LoginPassword.persistence(), Persistence::Inline);
        assert_eq!(
            RecordKind::Text.persistence(),
            Persistence::File(FileKind::Text)
        );
        assert_eq!(
            RecordKind::Binary.persistence(),
            Persistence::File(FileKind::Binary)
        );
        assert_eq!(RecordKind::Card.persistence(), Persistence::ClientOnly);
    }

    #[test]
    fn test_record_kind_parse() {
        for kind in RecordKind::ALL {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("password".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_backing_file_name_is_deterministic() {
        let account: AccountId = "6f1c1c2e-8a3e-4a5b-9d51-0d8b8d6f9a10".parse().unwrap();
        let a = FileKind::Text.backing_file_name(&account, "notes");
        let b = FileKind::Text.backing_file_name(&account, "notes");
        assert_eq!(a, b);
        assert_eq!(
            a,
            "text_6f1c1c2e-8a3e-4a5b-9d51-0d8b8d6f9a10_6e6f746573.txt"
        );
        assert_ne!(a, FileKind::Binary.backing_file_name(&account, "notes"));
    }

    #[test]
    fn test_backing_file_name_cannot_traverse() {
        let account = AccountId::new_random();
        let name = FileKind::Binary.backing_file_name(&account, "../../etc/passwd");
        assert!(!name.contains('/'));
        assert!(name.ends_with(".bin"));
    }

    #[test]
    fn test_session_token_debug_redacted() {
        let token = SessionToken::new("deadbeef");
        assert!(!format!("{token:?}").contains("deadbeef"));
    }
}
