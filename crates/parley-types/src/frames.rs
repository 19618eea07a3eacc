use serde::{Deserialize, Serialize};

/// Frames sent FROM client TO server over the chat stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientFrame {
    /// Send an encrypted payload into a chat. `content` is base64.
    Send { chat_id: i64, content: String },
}

/// Frames sent FROM server TO client over the chat stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerFrame {
    /// A message addressed to this user was persisted.
    Message {
        id: i64,
        chat_id: i64,
        sender_id: i64,
        content: String,
        created_at: chrono::DateTime<chrono::Utc>,
    },
}
