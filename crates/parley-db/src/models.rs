//! Database row types. These map directly to SQLite rows and are distinct
//! from the parley-types API models to keep the storage layer independent.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub public_key: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub sender_enc_key: Vec<u8>,
    pub receiver_enc_key: Vec<u8>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: Vec<u8>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRow {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: String,
    pub revoked_at: Option<String>,
}

/// Parse a stored timestamp. Columns filled by SQLite's datetime('now')
/// default hold "YYYY-MM-DD HH:MM:SS" without a timezone; columns written
/// by Rust hold RFC 3339.
pub fn parse_timestamp(value: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", value, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_default_format() {
        let ts = parse_timestamp("2026-08-07 12:30:00");
        assert_eq!(ts.to_rfc3339(), "2026-08-07T12:30:00+00:00");
    }

    #[test]
    fn parses_rfc3339() {
        let ts = parse_timestamp("2026-08-07T12:30:00+00:00");
        assert_eq!(ts.timestamp(), 1786105800);
    }
}
