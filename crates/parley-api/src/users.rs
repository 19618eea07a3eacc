use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::error;

use parley_db::models::{UserRow, parse_timestamp};
use parley_types::api::{AuthenticatedUser, PageQuery, UserResponse};

use crate::MAX_PAGE_SIZE;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_users(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let page_size = query.page_size.min(MAX_PAGE_SIZE);

    let rows = tokio::task::spawn_blocking(move || db.users_page(page_size, query.last_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })??;

    Ok(Json(rows.into_iter().map(user_response).collect::<Vec<_>>()))
}

// Password hashes never leave the storage layer through this mapping.
fn user_response(row: UserRow) -> UserResponse {
    UserResponse {
        id: row.id,
        name: row.name,
        public_key: row.public_key,
        created_at: parse_timestamp(&row.created_at),
    }
}
