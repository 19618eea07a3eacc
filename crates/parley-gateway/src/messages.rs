use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use parley_db::models::MessageRow;
use parley_db::{Database, queries};
use parley_types::DomainError;

/// Validate and persist an inbound message: the chat must exist and the
/// sender must be one of its two participants. Commits once.
pub async fn create_message(
    db: &Arc<Database>,
    chat_id: i64,
    sender_id: i64,
    content: Vec<u8>,
) -> Result<MessageRow, DomainError> {
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        db.with_tx(|tx| {
            let chat = queries::chat_by_id(tx, chat_id)?.ok_or_else(|| {
                DomainError::NotFound(format!("Chat with id {chat_id} does not exist."))
            })?;

            if chat.sender_id != sender_id && chat.receiver_id != sender_id {
                return Err(DomainError::PermissionDenied(format!(
                    "User with id {sender_id} is not a member of the chat with id {chat_id}."
                )));
            }

            let id = queries::insert_message(tx, chat_id, sender_id, &content)?;
            let message = queries::message_by_id(tx, id)?
                .ok_or_else(|| DomainError::Internal(anyhow!("Message {id} missing after insert")))?;
            Ok(message)
        })
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        DomainError::Internal(anyhow!("join error: {e}"))
    })?
}
