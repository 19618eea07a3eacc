use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::info;

use parley_db::{Database, queries};
use parley_types::DomainError;

use crate::password;
use crate::tokens::TokenManager;

#[derive(Debug)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Register/login/refresh/logout flows. All methods do blocking DB work;
/// async callers wrap them in spawn_blocking.
#[derive(Clone)]
pub struct AuthService {
    db: Arc<Database>,
    tokens: TokenManager,
}

impl AuthService {
    pub fn new(db: Arc<Database>, tokens: TokenManager) -> Self {
        Self { db, tokens }
    }

    pub fn register(
        &self,
        name: &str,
        password: &str,
        public_key: &str,
    ) -> Result<AuthTokens, DomainError> {
        let password_hash = password::hash_password(password)?;

        self.db.with_tx(|tx| {
            if queries::user_by_name(tx, name)?.is_some() {
                return Err(DomainError::AlreadyExists(format!(
                    "User with name {name} already exists."
                )));
            }

            let user_id = queries::insert_user(tx, name, public_key, &password_hash)?;
            info!("Registered user {} ({})", name, user_id);
            self.issue_pair(tx, user_id, name)
        })
    }

    pub fn login(&self, name: &str, password: &str) -> Result<AuthTokens, DomainError> {
        let user = self
            .db
            .user_by_name(name)?
            .ok_or_else(|| DomainError::NotFound(format!("User with name {name} does not exist.")))?;

        if !password::verify_password(password, &user.password_hash) {
            return Err(DomainError::Unauthenticated("Invalid password.".to_string()));
        }

        self.db.with_tx(|tx| self.issue_pair(tx, user.id, &user.name))
    }

    /// Rotate a refresh credential: revoke it and mint a fresh pair bound
    /// to the same user, all in one committed transaction.
    pub fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, DomainError> {
        self.db.with_tx(|tx| {
            let previous = revoke_existing(tx, refresh_token)?;

            let user = queries::user_by_id(tx, previous.user_id)?.ok_or_else(|| {
                DomainError::NotFound(format!(
                    "User with id {} does not exist.",
                    previous.user_id
                ))
            })?;

            self.issue_pair(tx, user.id, &user.name)
        })
    }

    /// Revoke without issuing a replacement.
    pub fn logout(&self, refresh_token: &str) -> Result<(), DomainError> {
        self.db.with_tx(|tx| {
            let revoked = revoke_existing(tx, refresh_token)?;
            info!("User {} logged out", revoked.user_id);
            Ok(())
        })
    }

    fn issue_pair(
        &self,
        tx: &rusqlite::Transaction<'_>,
        user_id: i64,
        name: &str,
    ) -> Result<AuthTokens, DomainError> {
        let access_token = self.tokens.issue_access_token(user_id, name)?;
        let (refresh_token, expires_at) = self.tokens.issue_refresh_token();

        queries::insert_refresh_token(tx, user_id, &refresh_token, &expires_at.to_rfc3339())?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
        })
    }
}

/// Look up a refresh credential and mark it revoked. Missing, expired or
/// already-revoked credentials are all InvalidCredential; the guarded
/// update closes the race between two concurrent rotations of the same
/// token.
fn revoke_existing(
    tx: &rusqlite::Transaction<'_>,
    refresh_token: &str,
) -> Result<parley_db::models::RefreshTokenRow, DomainError> {
    let row =
        queries::refresh_token_by_token(tx, refresh_token)?.ok_or(DomainError::InvalidCredential)?;

    let expires_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&row.expires_at)
        .map_err(|e| anyhow!("Corrupt expiry on refresh token {}: {}", row.id, e))?
        .with_timezone(&Utc);

    if row.revoked_at.is_some() || expires_at < Utc::now() {
        return Err(DomainError::InvalidCredential);
    }

    if !queries::revoke_refresh_token(tx, row.id, &Utc::now().to_rfc3339())? {
        return Err(DomainError::InvalidCredential);
    }

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenConfig;
    use chrono::Duration;

    fn service() -> AuthService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let tokens = TokenManager::new(TokenConfig {
            secret: "test-secret".to_string(),
            issuer: "parley-test".to_string(),
            audience: "parley-test-clients".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        });
        AuthService::new(db, tokens)
    }

    #[test]
    fn register_then_login() {
        let auth = service();
        auth.register("alice", "correct horse", "pk-alice").unwrap();

        let result = auth.login("alice", "correct horse").unwrap();
        assert!(!result.access_token.is_empty());
        assert!(!result.refresh_token.is_empty());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let auth = service();
        auth.register("alice", "pw-one-two", "pk").unwrap();

        let err = auth.register("alice", "pw-three-four", "pk").unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists(_)));
    }

    #[test]
    fn login_failures() {
        let auth = service();
        auth.register("alice", "correct horse", "pk").unwrap();

        let err = auth.login("bob", "whatever").unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        let err = auth.login("alice", "wrong horse").unwrap_err();
        assert!(matches!(err, DomainError::Unauthenticated(_)));
    }

    #[test]
    fn refresh_is_single_use() {
        let auth = service();
        let initial = auth.register("alice", "correct horse", "pk").unwrap();

        let rotated = auth.refresh(&initial.refresh_token).unwrap();
        assert_ne!(rotated.refresh_token, initial.refresh_token);

        let err = auth.refresh(&initial.refresh_token).unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredential));

        // The successor is still usable.
        auth.refresh(&rotated.refresh_token).unwrap();
    }

    #[test]
    fn unknown_refresh_token_is_rejected() {
        let auth = service();
        let err = auth.refresh("never-issued").unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredential));
    }

    #[test]
    fn logout_revokes_without_replacement() {
        let auth = service();
        let initial = auth.register("alice", "correct horse", "pk").unwrap();

        auth.logout(&initial.refresh_token).unwrap();

        let err = auth.refresh(&initial.refresh_token).unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredential));

        let err = auth.logout(&initial.refresh_token).unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredential));
    }
}
