use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

/// Outcome taxonomy for every RPC.
///
/// The `&'static str` payloads are user-safe and cross the trust boundary;
/// `Internal::detail` is for the server log only.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("already exists: {0}")]
    AlreadyExists(&'static str),

    #[error("invalid credential")]
    InvalidCredential,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("{context}: {detail}")]
    Internal {
        context: &'static str,
        detail: String,
    },
}

impl VaultError {
    pub fn internal(context: &'static str, detail: impl std::fmt::Display) -> Self {
        VaultError::Internal {
            context,
            detail: detail.to_string(),
        }
    }

    pub fn code(&self) -> tonic::Code {
        match self {
            VaultError::Unauthenticated(_) => tonic::Code::Unauthenticated,
            VaultError::NotFound(_) => tonic::Code::NotFound,
            VaultError::AlreadyExists(_) => tonic::Code::AlreadyExists,
            VaultError::InvalidCredential | VaultError::InvalidArgument(_) => {
                tonic::Code::InvalidArgument
            }
            VaultError::Internal { .. } => tonic::Code::Internal,
        }
    }
}

impl From<VaultError> for tonic::Status {
    fn from(err: VaultError) -> Self {
        let code = err.code();
        let message = match err {
            VaultError::Unauthenticated(msg)
            | VaultError::NotFound(msg)
            | VaultError::AlreadyExists(msg)
            | VaultError::InvalidArgument(msg) => msg.to_string(),
            VaultError::InvalidCredential => "incorrect password".to_string(),
            VaultError::Internal { context, .. } => context.to_string(),
        };
        tonic::Status::new(code, message)
    }
}
