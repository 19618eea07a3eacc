use std::sync::Arc;

use parley_auth::{AuthService, TokenManager};
use parley_db::Database;
use parley_gateway::Registry;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub auth: AuthService,
    pub tokens: TokenManager,
    pub registry: Registry,
}
