use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::error;

use parley_db::models::{ChatRow, MessageRow, parse_timestamp};
use parley_db::queries;
use parley_types::DomainError;
use parley_types::api::{
    AuthenticatedUser, ChatResponse, CreateChatRequest, MessageResponse, PageQuery,
};

use crate::MAX_PAGE_SIZE;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender_key = B64
        .decode(&req.sender_enc_key)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Key material must be base64."))?;
    let receiver_key = B64
        .decode(&req.receiver_enc_key)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Key material must be base64."))?;

    let db = state.db.clone();
    let sender_id = user.id;
    let receiver_id = req.receiver_id;

    // Run the whole validate-and-insert as one blocking transaction.
    let chat = tokio::task::spawn_blocking(move || {
        db.with_tx(|tx| {
            if sender_id == receiver_id {
                return Err(DomainError::InvalidArgument(
                    "Sender id and receiver id cannot be identical.".to_string(),
                ));
            }
            if queries::user_by_id(tx, sender_id)?.is_none() {
                return Err(DomainError::NotFound(format!(
                    "User with id {sender_id} does not exist."
                )));
            }
            if queries::user_by_id(tx, receiver_id)?.is_none() {
                return Err(DomainError::NotFound(format!(
                    "User with id {receiver_id} does not exist."
                )));
            }
            if queries::chat_between(tx, sender_id, receiver_id)?.is_some() {
                return Err(DomainError::AlreadyExists(format!(
                    "Chat between user with id {sender_id} and user with id {receiver_id} already exists."
                )));
            }

            let id = queries::insert_chat(tx, sender_id, receiver_id, &sender_key, &receiver_key)?;
            queries::chat_by_id(tx, id)?
                .ok_or_else(|| DomainError::Internal(anyhow!("Chat {id} missing after insert")))
        })
    })
    .await
    .map_err(join_error)??;

    Ok((StatusCode::CREATED, Json(chat_response(chat))))
}

pub async fn get_chats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let page_size = query.page_size.min(MAX_PAGE_SIZE);

    let rows =
        tokio::task::spawn_blocking(move || db.chats_page(user.id, page_size, query.last_id))
            .await
            .map_err(join_error)??;

    Ok(Json(
        rows.into_iter().map(chat_response).collect::<Vec<_>>(),
    ))
}

pub async fn get_message_history(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Extension(_user): Extension<AuthenticatedUser>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let page_size = query.page_size.min(MAX_PAGE_SIZE);

    let rows =
        tokio::task::spawn_blocking(move || db.messages_page(chat_id, page_size, query.last_id))
            .await
            .map_err(join_error)??;

    Ok(Json(
        rows.into_iter().map(message_response).collect::<Vec<_>>(),
    ))
}

fn chat_response(row: ChatRow) -> ChatResponse {
    ChatResponse {
        id: row.id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        sender_enc_key: B64.encode(&row.sender_enc_key),
        receiver_enc_key: B64.encode(&row.receiver_enc_key),
        created_at: parse_timestamp(&row.created_at),
    }
}

fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        chat_id: row.chat_id,
        sender_id: row.sender_id,
        content: B64.encode(&row.content),
        created_at: parse_timestamp(&row.created_at),
    }
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::internal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{Router, body::Body, http::Request, routing::post};
    use chrono::Duration;
    use tower::ServiceExt;

    use parley_auth::{AuthService, TokenConfig, TokenManager};
    use parley_db::Database;
    use parley_gateway::Registry;

    use crate::state::AppStateInner;

    fn state_with_users(names: &[&str]) -> (AppState, Vec<i64>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ids = db
            .with_conn(|conn| {
                names
                    .iter()
                    .map(|name| queries::insert_user(conn, name, "pk", "hash"))
                    .collect()
            })
            .unwrap();

        let tokens = TokenManager::new(TokenConfig {
            secret: "test-secret".to_string(),
            issuer: "parley-test".to_string(),
            audience: "parley-test-clients".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        });
        let state = Arc::new(AppStateInner {
            db: db.clone(),
            auth: AuthService::new(db.clone(), tokens.clone()),
            tokens,
            registry: Registry::new(db),
        });
        (state, ids)
    }

    fn app(state: AppState, user_id: i64) -> Router {
        Router::new()
            .route("/chats", post(create_chat))
            .layer(axum::Extension(AuthenticatedUser {
                id: user_id,
                name: "test".to_string(),
            }))
            .with_state(state)
    }

    async fn post_chat(app: Router, receiver_id: i64) -> StatusCode {
        let body = format!(
            r#"{{"receiver_id":{receiver_id},"sender_enc_key":"a2V5","receiver_enc_key":"a2V5"}}"#
        );
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri("/chats")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    #[tokio::test]
    async fn self_chat_is_invalid() {
        let (state, ids) = state_with_users(&["alice"]);
        assert_eq!(
            post_chat(app(state, ids[0]), ids[0]).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn pair_is_unique_in_either_order() {
        let (state, ids) = state_with_users(&["alice", "bob"]);

        assert_eq!(
            post_chat(app(state.clone(), ids[0]), ids[1]).await,
            StatusCode::CREATED
        );
        assert_eq!(
            post_chat(app(state.clone(), ids[0]), ids[1]).await,
            StatusCode::CONFLICT
        );
        assert_eq!(
            post_chat(app(state, ids[1]), ids[0]).await,
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn unknown_receiver_is_not_found() {
        let (state, ids) = state_with_users(&["alice"]);
        assert_eq!(
            post_chat(app(state, ids[0]), 9999).await,
            StatusCode::NOT_FOUND
        );
    }
}
