use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::middleware::require_auth;
use parley_api::state::{AppState, AppStateInner};
use parley_api::{auth, chats, users};
use parley_auth::{AuthService, TokenConfig, TokenManager};
use parley_db::Database;
use parley_gateway::{Registry, connection};
use parley_types::api::AuthenticatedUser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let issuer = std::env::var("PARLEY_JWT_ISSUER").unwrap_or_else(|_| "parley".into());
    let audience =
        std::env::var("PARLEY_JWT_AUDIENCE").unwrap_or_else(|_| "parley-clients".into());
    let access_ttl_minutes: i64 = std::env::var("PARLEY_ACCESS_TTL_MINUTES")
        .unwrap_or_else(|_| "15".into())
        .parse()?;
    let refresh_ttl_days: i64 = std::env::var("PARLEY_REFRESH_TTL_DAYS")
        .unwrap_or_else(|_| "7".into())
        .parse()?;
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let tokens = TokenManager::new(TokenConfig {
        secret: jwt_secret,
        issuer,
        audience,
        access_ttl: chrono::Duration::minutes(access_ttl_minutes),
        refresh_ttl: chrono::Duration::days(refresh_ttl_days),
    });
    let registry = Registry::new(db.clone());
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        auth: AuthService::new(db, tokens.clone()),
        tokens,
        registry,
    });

    // Routes: the auth entry points bypass the gate; everything else,
    // including the stream upgrade, sits behind the one auth middleware.
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/chats", post(chats::create_chat).get(chats::get_chats))
        .route("/chats/{chat_id}/messages", get(chats::get_message_history))
        .route("/users", get(users::get_users))
        .route("/chat/stream", get(chat_stream))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn chat_stream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.registry.clone(), state.db.clone(), user)
    })
}
