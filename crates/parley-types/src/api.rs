use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// JWT claims shared between parley-auth (token issuance/validation) and
/// parley-api (auth-gate middleware). Canonical definition lives here in
/// parley-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub jti: String,
    pub iss: String,
    pub aud: String,
    pub exp: usize,
}

/// Identity derived from a validated access token. Lives for one request
/// or one stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub name: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

// -- Chats --

/// Key material is carried base64-encoded; the server never interprets it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    pub receiver_id: i64,
    pub sender_enc_key: String,
    pub receiver_enc_key: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub sender_enc_key: String,
    pub receiver_enc_key: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Users --

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub public_key: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Pagination --

/// Cursor-paged listing: pass the smallest id from the previous page as
/// `last_id` to fetch older entries. No cursor means "from the most recent".
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub last_id: Option<i64>,
}

fn default_page_size() -> u32 {
    50
}
