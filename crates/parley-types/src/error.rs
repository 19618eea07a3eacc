use thiserror::Error;

/// Typed failures raised by the domain layer. The protocol boundary
/// (parley-api for HTTP, the stream coordinator for close frames) is the
/// single place these are mapped to transport statuses.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidArgument(String),

    /// Missing, expired, revoked or unknown refresh credential.
    #[error("Invalid refresh token.")]
    InvalidCredential,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
