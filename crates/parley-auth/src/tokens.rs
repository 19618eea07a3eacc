use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::{OsRng, RngCore};
use uuid::Uuid;

use parley_types::api::{AuthenticatedUser, Claims};

const REFRESH_TOKEN_BYTES: usize = 64;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Issues and validates access tokens, and mints refresh credentials.
/// Refresh credential storage and rotation live in `AuthService`.
#[derive(Clone)]
pub struct TokenManager {
    config: TokenConfig,
}

impl TokenManager {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    /// Signed, time-boxed access token with a unique jti.
    pub fn issue_access_token(&self, user_id: i64, name: &str) -> Result<String> {
        let claims = Claims {
            sub: user_id,
            name: name.to_string(),
            jti: Uuid::new_v4().to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: (Utc::now() + self.config.access_ttl).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Opaque random refresh credential and its expiry instant.
    pub fn issue_refresh_token(&self) -> (String, DateTime<Utc>) {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        (B64.encode(bytes), Utc::now() + self.config.refresh_ttl)
    }

    /// Verify signature, issuer, audience and expiry (zero clock-skew
    /// leeway). Any failure yields None.
    pub fn validate_access_token(&self, token: &str) -> Option<AuthenticatedUser> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )
        .ok()?;

        Some(AuthenticatedUser {
            id: data.claims.sub,
            name: data.claims.name,
        })
    }
}
