pub mod password;
pub mod service;
pub mod tokens;

pub use service::{AuthService, AuthTokens};
pub use tokens::{TokenConfig, TokenManager};
