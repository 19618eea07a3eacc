use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use parley_types::api::{
    AuthResponse, LoginRequest, LogoutRequest, LogoutResponse, RefreshRequest, RegisterRequest,
};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = state.auth.clone();
    let result = tokio::task::spawn_blocking(move || {
        auth.register(&req.name, &req.password, &req.public_key)
    })
    .await
    .map_err(join_error)??;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token: result.access_token,
            refresh_token: result.refresh_token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = state.auth.clone();
    let result = tokio::task::spawn_blocking(move || auth.login(&req.name, &req.password))
        .await
        .map_err(join_error)??;

    Ok(Json(AuthResponse {
        access_token: result.access_token,
        refresh_token: result.refresh_token,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = state.auth.clone();
    let result = tokio::task::spawn_blocking(move || auth.refresh(&req.refresh_token))
        .await
        .map_err(join_error)??;

    Ok(Json(AuthResponse {
        access_token: result.access_token,
        refresh_token: result.refresh_token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = state.auth.clone();
    tokio::task::spawn_blocking(move || auth.logout(&req.refresh_token))
        .await
        .map_err(join_error)??;

    Ok(Json(LogoutResponse {
        message: "Logout successful.".to_string(),
    }))
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::internal()
}
