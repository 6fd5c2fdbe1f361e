use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use tether_types::events::RealtimeEvent;

struct PresenceEntry {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<RealtimeEvent>,
    last_seen: DateTime<Utc>,
}

/// In-memory map of user id -> live outbound channel. One entry per user;
/// a new connection supersedes the old one. Entries exist only while a
/// connection is open and are never persisted; on process start everyone
/// is offline until they reconnect. Reachability cache only, never
/// authoritative for delivery.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<Uuid, PresenceEntry>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live channel for `user_id`, superseding any stale entry,
    /// and stamp last-seen. Returns the connection id (which guards
    /// teardown) and the receiving end the connection loop drains.
    pub async fn connect(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.insert(
            user_id,
            PresenceEntry {
                conn_id,
                tx,
                last_seen: Utc::now(),
            },
        );
        (conn_id, rx)
    }

    /// Remove the entry for `user_id`, but only if `conn_id` still owns it.
    /// Returns whether an entry was removed; a superseded connection's
    /// teardown must not evict its successor.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut entries = self.inner.write().await;
        if let Some(entry) = entries.get(&user_id) {
            if entry.conn_id == conn_id {
                entries.remove(&user_id);
                return true;
            }
        }
        false
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.inner.read().await.get(&user_id).map(|e| e.last_seen)
    }

    /// Best-effort push. No queue, no retry: an absent entry is a silent
    /// no-op, and a dead channel evicts the entry (the user is treated as
    /// disconnected). Returns whether the event was accepted by a live
    /// channel.
    pub async fn send(&self, user_id: Uuid, event: RealtimeEvent) -> bool {
        let dead_conn = {
            let entries = self.inner.read().await;
            match entries.get(&user_id) {
                None => return false,
                Some(entry) => {
                    if entry.tx.send(event).is_ok() {
                        return true;
                    }
                    entry.conn_id
                }
            }
        };

        debug!("presence channel for {} is dead, evicting", user_id);
        self.disconnect(user_id, dead_conn).await;
        false
    }

    /// Everyone currently connected except `exclude`.
    pub async fn connected_users(&self, exclude: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .keys()
            .copied()
            .filter(|id| *id != exclude)
            .collect()
    }
}
