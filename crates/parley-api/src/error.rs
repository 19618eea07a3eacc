use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use parley_types::DomainError;

/// The single place typed domain failures become transport statuses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::AlreadyExists(m) => Self::new(StatusCode::CONFLICT, m),
            DomainError::NotFound(m) => Self::new(StatusCode::NOT_FOUND, m),
            DomainError::Unauthenticated(m) => Self::new(StatusCode::UNAUTHORIZED, m),
            DomainError::PermissionDenied(m) => Self::new(StatusCode::FORBIDDEN, m),
            DomainError::InvalidArgument(m) => Self::new(StatusCode::BAD_REQUEST, m),
            DomainError::InvalidCredential => {
                Self::new(StatusCode::UNAUTHORIZED, DomainError::InvalidCredential.to_string())
            }
            DomainError::Internal(e) => {
                error!("Internal error: {:#}", e);
                Self::internal()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("Internal error: {:#}", err);
        Self::internal()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::AlreadyExists("x".into()), StatusCode::CONFLICT),
            (DomainError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (DomainError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (DomainError::PermissionDenied("x".into()), StatusCode::FORBIDDEN),
            (DomainError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (DomainError::InvalidCredential, StatusCode::UNAUTHORIZED),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
