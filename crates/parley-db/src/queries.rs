use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use crate::Database;
use crate::models::{ChatRow, MessageRow, RefreshTokenRow, UserRow};

// Read-side convenience wrappers. Writes go through Database::with_tx with
// the connection-level functions below, so each logical operation commits
// exactly once.
impl Database {
    pub fn user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| user_by_id(conn, id))
    }

    pub fn user_by_name(&self, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| user_by_name(conn, name))
    }

    pub fn users_page(&self, page_size: u32, last_id: Option<i64>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| users_page(conn, page_size, last_id))
    }

    pub fn chat_by_id(&self, id: i64) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| chat_by_id(conn, id))
    }

    pub fn chats_page(
        &self,
        user_id: i64,
        page_size: u32,
        last_id: Option<i64>,
    ) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| chats_page(conn, user_id, page_size, last_id))
    }

    pub fn messages_page(
        &self,
        chat_id: i64,
        page_size: u32,
        last_id: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| messages_page(conn, chat_id, page_size, last_id))
    }

    pub fn refresh_token_by_token(&self, token: &str) -> Result<Option<RefreshTokenRow>> {
        self.with_conn(|conn| refresh_token_by_token(conn, token))
    }
}

// -- Users --

pub fn insert_user(
    conn: &Connection,
    name: &str,
    public_key: &str,
    password_hash: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (name, public_key, password_hash) VALUES (?1, ?2, ?3)",
        params![name, public_key, password_hash],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, public_key, password_hash, created_at FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn user_by_name(conn: &Connection, name: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, public_key, password_hash, created_at FROM users WHERE name = ?1",
            [name],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn users_page(conn: &Connection, page_size: u32, last_id: Option<i64>) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, public_key, password_hash, created_at FROM users
         WHERE id < ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![last_id.unwrap_or(i64::MAX), page_size], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        public_key: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// -- Chats --

pub fn insert_chat(
    conn: &Connection,
    sender_id: i64,
    receiver_id: i64,
    sender_enc_key: &[u8],
    receiver_enc_key: &[u8],
) -> Result<i64> {
    conn.execute(
        "INSERT INTO chats (sender_id, receiver_id, sender_enc_key, receiver_enc_key)
         VALUES (?1, ?2, ?3, ?4)",
        params![sender_id, receiver_id, sender_enc_key, receiver_enc_key],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn chat_by_id(conn: &Connection, id: i64) -> Result<Option<ChatRow>> {
    let row = conn
        .query_row(
            "SELECT id, sender_id, receiver_id, sender_enc_key, receiver_enc_key, created_at
             FROM chats WHERE id = ?1",
            [id],
            chat_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Look up the chat for an unordered participant pair.
pub fn chat_between(conn: &Connection, a: i64, b: i64) -> Result<Option<ChatRow>> {
    let row = conn
        .query_row(
            "SELECT id, sender_id, receiver_id, sender_enc_key, receiver_enc_key, created_at
             FROM chats
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)",
            params![a, b],
            chat_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn chats_page(
    conn: &Connection,
    user_id: i64,
    page_size: u32,
    last_id: Option<i64>,
) -> Result<Vec<ChatRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, sender_enc_key, receiver_enc_key, created_at
         FROM chats
         WHERE (sender_id = ?1 OR receiver_id = ?1) AND id < ?2
         ORDER BY id DESC LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(
            params![user_id, last_id.unwrap_or(i64::MAX), page_size],
            chat_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn chat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        sender_enc_key: row.get(3)?,
        receiver_enc_key: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// -- Messages --

pub fn insert_message(
    conn: &Connection,
    chat_id: i64,
    sender_id: i64,
    content: &[u8],
) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (chat_id, sender_id, content) VALUES (?1, ?2, ?3)",
        params![chat_id, sender_id, content],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn message_by_id(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let row = conn
        .query_row(
            "SELECT id, chat_id, sender_id, content, created_at FROM messages WHERE id = ?1",
            [id],
            message_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn messages_page(
    conn: &Connection,
    chat_id: i64,
    page_size: u32,
    last_id: Option<i64>,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, sender_id, content, created_at FROM messages
         WHERE chat_id = ?1 AND id < ?2
         ORDER BY id DESC LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(
            params![chat_id, last_id.unwrap_or(i64::MAX), page_size],
            message_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// -- Refresh tokens --

pub fn insert_refresh_token(
    conn: &Connection,
    user_id: i64,
    token: &str,
    expires_at: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO refresh_tokens (user_id, token, expires_at) VALUES (?1, ?2, ?3)",
        params![user_id, token, expires_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn refresh_token_by_token(conn: &Connection, token: &str) -> Result<Option<RefreshTokenRow>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, token, expires_at, revoked_at FROM refresh_tokens
             WHERE token = ?1",
            [token],
            |row| {
                Ok(RefreshTokenRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    token: row.get(2)?,
                    expires_at: row.get(3)?,
                    revoked_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Mark a refresh token revoked. Returns false if it was already revoked;
/// the guarded UPDATE makes rotation single-use even under a concurrent
/// renewal race.
pub fn revoke_refresh_token(conn: &Connection, id: i64, revoked_at: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE refresh_tokens SET revoked_at = ?1 WHERE id = ?2 AND revoked_at IS NULL",
        params![revoked_at, id],
    )?;
    Ok(changed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn seed_users(db: &Database, names: &[&str]) -> Vec<i64> {
        db.with_conn(|conn| {
            names
                .iter()
                .map(|name| insert_user(conn, name, "pk", "hash"))
                .collect()
        })
        .unwrap()
    }

    #[test]
    fn chat_between_matches_either_order() {
        let db = Database::open_in_memory().unwrap();
        let ids = seed_users(&db, &["alice", "bob"]);

        db.with_conn(|conn| {
            insert_chat(conn, ids[0], ids[1], b"ka", b"kb")?;
            assert!(chat_between(conn, ids[0], ids[1])?.is_some());
            assert!(chat_between(conn, ids[1], ids[0])?.is_some());
            assert!(chat_between(conn, ids[0], ids[0] + 100)?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn message_page_cursor_walks_backwards() {
        let db = Database::open_in_memory().unwrap();
        let ids = seed_users(&db, &["alice", "bob"]);

        db.with_conn(|conn| {
            let chat_id = insert_chat(conn, ids[0], ids[1], b"ka", b"kb")?;
            for i in 0..5u8 {
                insert_message(conn, chat_id, ids[0], &[i])?;
            }

            let first = messages_page(conn, chat_id, 2, None)?;
            assert_eq!(first.len(), 2);
            assert!(first[0].id > first[1].id);

            let cursor = first.last().map(|m| m.id);
            let second = messages_page(conn, chat_id, 2, cursor)?;
            assert_eq!(second.len(), 2);
            assert!(second[0].id < first[1].id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn revoke_is_single_use() {
        let db = Database::open_in_memory().unwrap();
        let ids = seed_users(&db, &["alice"]);

        db.with_conn(|conn| {
            let id = insert_refresh_token(conn, ids[0], "tok", "2099-01-01T00:00:00+00:00")?;
            assert!(revoke_refresh_token(conn, id, "2026-01-01T00:00:00+00:00")?);
            assert!(!revoke_refresh_token(conn, id, "2026-01-01T00:00:01+00:00")?);

            let row = refresh_token_by_token(conn, "tok")?.unwrap();
            assert_eq!(row.revoked_at.as_deref(), Some("2026-01-01T00:00:00+00:00"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn duplicate_user_name_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        seed_users(&db, &["alice"]);

        let result = db.with_conn(|conn| insert_user(conn, "alice", "pk2", "hash2"));
        assert!(result.is_err());
    }
}
