use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// The auth gate: one middleware guarding every protected route,
/// request/response handlers and the stream upgrade alike. Validates the
/// bearer token and attaches the authenticated identity to the request.
/// The /auth entry points are mounted outside this layer.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
        return Err(ApiError::unauthenticated("Authorization token is required."));
    };

    let Some(user) = state.tokens.validate_access_token(token) else {
        warn!(
            "Authentication failed for {}: invalid token",
            req.uri().path()
        );
        return Err(ApiError::unauthenticated("Invalid token."));
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
