use thiserror::Error;

use vault_core::types::RecordKind;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The server's status message is shown as-is; it is user-safe by contract.
    #[error("{}", .0.message())]
    Rpc(#[from] tonic::Status),

    #[error("{field} {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    #[error("{0} records are not supported by the server")]
    Unsupported(RecordKind),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed server response: {0}")]
    Malformed(String),
}

impl ClientError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ClientError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// gRPC status code, when the server rejected the call
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            ClientError::Rpc(status) => Some(status.code()),
            _ => None,
        }
    }
}
