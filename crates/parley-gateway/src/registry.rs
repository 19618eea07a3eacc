use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use parley_db::Database;
use parley_db::models::{MessageRow, parse_timestamp};
use parley_types::frames::ServerFrame;

struct Session {
    conn_id: u64,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

/// Process-wide session registry and broadcaster. Created once at server
/// start and injected into the stream coordinator and the API layer;
/// maps each connected user to their single outbound frame channel.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: DashMap<i64, Session>,
    next_conn_id: AtomicU64,
    db: Arc<Database>,
}

impl Registry {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                next_conn_id: AtomicU64::new(1),
                db,
            }),
        }
    }

    /// Install a fresh outbound channel as the user's active sink,
    /// replacing any prior one (last writer wins; the displaced
    /// connection sees its channel close and winds itself down).
    /// Returns the connection id and the receiving half.
    pub fn connect(&self, user_id: i64) -> (u64, mpsc::UnboundedReceiver<ServerFrame>) {
        let conn_id = self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.sessions.insert(user_id, Session { conn_id, tx });
        info!("User {} connected to broadcaster", user_id);
        (conn_id, rx)
    }

    /// Remove the user's session, but only if `conn_id` still owns it.
    /// A displaced connection's late cleanup must not evict its successor.
    pub fn disconnect(&self, user_id: i64, conn_id: u64) {
        let removed = self
            .inner
            .sessions
            .remove_if(&user_id, |_, session| session.conn_id == conn_id);
        if removed.is_some() {
            info!("User {} disconnected from broadcaster", user_id);
        }
    }

    pub fn is_connected(&self, user_id: i64) -> bool {
        self.inner.sessions.contains_key(&user_id)
    }

    /// Route a persisted message to its chat counterpart, if connected.
    /// Delivery is best effort: no chat, no session, or a broken sink
    /// never surfaces to the sender. A broken sink evicts that session.
    pub async fn broadcast(&self, message: &MessageRow) {
        let db = self.inner.db.clone();
        let chat_id = message.chat_id;
        let chat = match tokio::task::spawn_blocking(move || db.chat_by_id(chat_id)).await {
            Ok(Ok(chat)) => chat,
            Ok(Err(e)) => {
                error!("Chat lookup failed for broadcast of message {}: {}", message.id, e);
                return;
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                return;
            }
        };

        let Some(chat) = chat else {
            debug!("Dropping message {} for unknown chat {}", message.id, chat_id);
            return;
        };

        let recipient_id = if chat.sender_id == message.sender_id {
            chat.receiver_id
        } else {
            chat.sender_id
        };

        // Clone the sender out of the map entry before using it; holding
        // the shard ref while removing the same key would deadlock.
        let Some((conn_id, tx)) = self
            .inner
            .sessions
            .get(&recipient_id)
            .map(|session| (session.conn_id, session.tx.clone()))
        else {
            return;
        };

        if tx.send(frame_for(message)).is_err() {
            warn!(
                "Failed to broadcast to user {}. Removing stale session.",
                recipient_id
            );
            self.inner
                .sessions
                .remove_if(&recipient_id, |_, session| session.conn_id == conn_id);
        } else {
            info!("Broadcast message {} to user {}", message.id, recipient_id);
        }
    }
}

fn frame_for(message: &MessageRow) -> ServerFrame {
    ServerFrame::Message {
        id: message.id,
        chat_id: message.chat_id,
        sender_id: message.sender_id,
        content: B64.encode(&message.content),
        created_at: parse_timestamp(&message.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_db::queries;

    fn setup() -> (Registry, Arc<Database>, i64, i64, i64) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (alice, bob, chat) = db
            .with_conn(|conn| {
                let alice = queries::insert_user(conn, "alice", "pk", "hash")?;
                let bob = queries::insert_user(conn, "bob", "pk", "hash")?;
                let chat = queries::insert_chat(conn, alice, bob, b"ka", b"kb")?;
                Ok((alice, bob, chat))
            })
            .unwrap();
        (Registry::new(db.clone()), db, alice, bob, chat)
    }

    fn message(chat_id: i64, sender_id: i64, content: &[u8]) -> MessageRow {
        MessageRow {
            id: 1,
            chat_id,
            sender_id,
            content: content.to_vec(),
            created_at: "2026-08-07 12:00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_only_the_recipient() {
        let (registry, _db, alice, bob, chat) = setup();
        let (_, mut alice_rx) = registry.connect(alice);
        let (_, mut bob_rx) = registry.connect(bob);

        registry.broadcast(&message(chat, alice, b"sealed")).await;

        let ServerFrame::Message {
            chat_id,
            sender_id,
            content,
            ..
        } = bob_rx.recv().await.unwrap();
        assert_eq!(chat_id, chat);
        assert_eq!(sender_id, alice);
        assert_eq!(B64.decode(content).unwrap(), b"sealed");

        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_recipient_drops_silently() {
        let (registry, _db, alice, _bob, chat) = setup();
        let (_, _alice_rx) = registry.connect(alice);

        // Bob never connected; nothing to deliver, nothing to fail.
        registry.broadcast(&message(chat, alice, b"sealed")).await;
    }

    #[tokio::test]
    async fn unknown_chat_drops_silently() {
        let (registry, _db, alice, bob, _chat) = setup();
        let (_, mut bob_rx) = registry.connect(bob);

        registry.broadcast(&message(9999, alice, b"sealed")).await;
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broken_sink_evicts_the_session() {
        let (registry, _db, alice, bob, chat) = setup();
        let (_, bob_rx) = registry.connect(bob);
        drop(bob_rx);

        registry.broadcast(&message(chat, alice, b"sealed")).await;
        assert!(!registry.is_connected(bob));

        // A later broadcast to the evicted user is a silent drop.
        registry.broadcast(&message(chat, alice, b"again")).await;
    }

    #[tokio::test]
    async fn reconnect_replaces_prior_sink() {
        let (registry, _db, alice, bob, chat) = setup();
        let (old_conn, mut old_rx) = registry.connect(bob);
        let (_, mut new_rx) = registry.connect(bob);

        // The displaced channel closes; the new one receives.
        assert!(old_rx.recv().await.is_none());
        registry.broadcast(&message(chat, alice, b"sealed")).await;
        assert!(new_rx.recv().await.is_some());

        // Late cleanup from the displaced connection must not evict the
        // successor.
        registry.disconnect(bob, old_conn);
        assert!(registry.is_connected(bob));
    }
}
