use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use parley_db::Database;
use parley_types::DomainError;
use parley_types::api::AuthenticatedUser;
use parley_types::frames::ClientFrame;

use crate::messages;
use crate::registry::Registry;

// Close codes for terminal stream errors (4xxx range is app-defined).
const CLOSE_NOT_IN_CHAT: u16 = 4403;
const CLOSE_CHAT_NOT_FOUND: u16 = 4404;
const CLOSE_INTERNAL: u16 = 1011;

/// Handle one authenticated chat-stream connection. Identity was already
/// established by the auth gate at the HTTP upgrade layer.
///
/// The whole connection runs as one select loop that owns the socket's
/// write half, so forwarded broadcasts and anything we emit ourselves are
/// serialized through a single writer. Inbound sends are processed one at
/// a time: the next frame is not read until the current one has been
/// persisted and handed to the broadcaster.
pub async fn handle_connection(
    socket: WebSocket,
    registry: Registry,
    db: Arc<Database>,
    user: AuthenticatedUser,
) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound) = registry.connect(user.id);

    info!("{} ({}) connected to chat stream", user.name, user.id);

    let close_frame = loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        let text = serde_json::to_string(&frame).unwrap();
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break None;
                        }
                    }
                    // Channel closed: a newer connection replaced this one.
                    None => break None,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(
                                    "{} ({}) unrecognized frame: {} -- raw: {}",
                                    user.name,
                                    user.id,
                                    e,
                                    &text[..text.len().min(200)]
                                );
                                continue;
                            }
                        };

                        let ClientFrame::Send { chat_id, content } = frame;
                        let Ok(content) = B64.decode(&content) else {
                            warn!(
                                "{} ({}) sent undecodable payload on chat {}",
                                user.name, user.id, chat_id
                            );
                            continue;
                        };

                        match process_send(&registry, &db, &user, chat_id, content).await {
                            Ok(()) => {}
                            Err(err) => break Some(close_frame_for(&err)),
                        }
                    }
                    // Client hung up, cleanly or not. Not an error.
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        info!("{} ({}) stream ended: {}", user.name, user.id, e);
                        break None;
                    }
                }
            }
        }
    };

    if let Some(frame) = close_frame {
        let _ = sender.send(Message::Close(Some(frame))).await;
    }

    // Cleanup runs on every exit path exactly once.
    registry.disconnect(user.id, conn_id);
    info!("{} ({}) disconnected from chat stream", user.name, user.id);
}

async fn process_send(
    registry: &Registry,
    db: &Arc<Database>,
    user: &AuthenticatedUser,
    chat_id: i64,
    content: Vec<u8>,
) -> Result<(), DomainError> {
    let message = messages::create_message(db, chat_id, user.id, content).await?;
    registry.broadcast(&message).await;
    Ok(())
}

fn close_frame_for(err: &DomainError) -> CloseFrame {
    let (code, reason) = match err {
        DomainError::NotFound(m) => (CLOSE_CHAT_NOT_FOUND, m.clone()),
        DomainError::PermissionDenied(m) => (CLOSE_NOT_IN_CHAT, m.clone()),
        _ => (CLOSE_INTERNAL, "Internal error.".to_string()),
    };
    CloseFrame {
        code,
        reason: reason.into(),
    }
}
