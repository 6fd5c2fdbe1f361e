use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use tether_types::events::{RealtimeEvent, SenderInfo};
use tether_types::models::Message;

use crate::presence::PresenceRegistry;

/// Builds typed events and pushes them through the presence registry.
/// Every push is best-effort: the boolean outcomes exist for logging, and
/// callers must never treat a dropped push as operation failure; durability
/// lives in the message store.
#[derive(Clone, Default)]
pub struct Dispatcher {
    presence: PresenceRegistry,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Register a connection and announce the user as online to everyone
    /// else currently connected.
    pub async fn connect(&self, user_id: Uuid) -> (Uuid, tokio::sync::mpsc::UnboundedReceiver<RealtimeEvent>) {
        let handle = self.presence.connect(user_id).await;
        self.broadcast_status(user_id, true).await;
        handle
    }

    /// Deregister a connection (conn-id guarded) and, if it was still the
    /// live one, announce the user as offline.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: Uuid) {
        if self.presence.disconnect(user_id, conn_id).await {
            self.broadcast_status(user_id, false).await;
        }
    }

    /// Push a new message to its receiver.
    pub async fn notify_message(&self, message: Message, sender: SenderInfo) -> bool {
        let receiver = message.receiver_id;
        let accepted = self
            .presence
            .send(
                receiver,
                RealtimeEvent::Message {
                    data: message,
                    sender,
                },
            )
            .await;
        if !accepted {
            debug!("message push to {} dropped (offline)", receiver);
        }
        accepted
    }

    /// Push a reaction change to the other participant. An empty emoji
    /// means the reaction was removed.
    pub async fn notify_reaction(
        &self,
        target: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    ) -> bool {
        self.presence
            .send(
                target,
                RealtimeEvent::Reaction {
                    message_id,
                    user_id,
                    emoji,
                },
            )
            .await
    }

    /// Tell `target` that `reader` just marked their messages as read.
    /// Sent unconditionally; the signal is idempotent.
    pub async fn notify_read_receipt(&self, target: Uuid, reader: Uuid) -> bool {
        self.presence
            .send(target, RealtimeEvent::ReadReceipt { chat_user_id: reader })
            .await
    }

    /// Fan a `user_status` event out to every connected user except the
    /// acting one. Unordered, best-effort, O(connected users).
    pub async fn broadcast_status(&self, user_id: Uuid, is_online: bool) {
        let event = RealtimeEvent::UserStatus {
            user_id,
            is_online,
            last_seen: Utc::now(),
        };

        for peer in self.presence.connected_users(user_id).await {
            self.presence.send(peer, event.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recv_status(rx: &mut tokio::sync::mpsc::UnboundedReceiver<RealtimeEvent>) -> (Uuid, bool) {
        match rx.try_recv().expect("expected a pending event") {
            RealtimeEvent::UserStatus {
                user_id, is_online, ..
            } => (user_id, is_online),
            other => panic!("expected user_status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn status_reaches_everyone_but_the_actor() {
        let dispatcher = Dispatcher::new();
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let (_a_conn, mut a_rx) = dispatcher.connect(alice).await;
        let (_b_conn, mut b_rx) = dispatcher.connect(bob).await;

        // Alice heard about Bob coming online; Bob heard nothing yet.
        assert_eq!(recv_status(&mut a_rx), (bob, true));
        assert!(b_rx.try_recv().is_err());

        let (carol_conn, mut c_rx) = dispatcher.connect(carol).await;
        assert_eq!(recv_status(&mut a_rx), (carol, true));
        assert_eq!(recv_status(&mut b_rx), (carol, true));
        assert!(c_rx.try_recv().is_err());

        dispatcher.disconnect(carol, carol_conn).await;
        assert_eq!(recv_status(&mut a_rx), (carol, false));
        assert_eq!(recv_status(&mut b_rx), (carol, false));
    }

    #[tokio::test]
    async fn superseded_disconnect_stays_silent() {
        let dispatcher = Dispatcher::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (_a_conn, mut a_rx) = dispatcher.connect(alice).await;
        let (old_conn, _old_rx) = dispatcher.connect(bob).await;
        let (_new_conn, _new_rx) = dispatcher.connect(bob).await;
        while a_rx.try_recv().is_ok() {}

        // The replaced connection tearing down must not announce offline.
        dispatcher.disconnect(bob, old_conn).await;
        assert!(a_rx.try_recv().is_err());
        assert!(dispatcher.presence().is_online(bob).await);
    }

    #[tokio::test]
    async fn read_receipt_is_targeted() {
        let dispatcher = Dispatcher::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (_a_conn, mut a_rx) = dispatcher.connect(alice).await;
        let (_b_conn, mut b_rx) = dispatcher.connect(bob).await;
        while a_rx.try_recv().is_ok() {}

        assert!(dispatcher.notify_read_receipt(bob, alice).await);
        match b_rx.try_recv().unwrap() {
            RealtimeEvent::ReadReceipt { chat_user_id } => assert_eq!(chat_user_id, alice),
            other => panic!("expected read_receipt, got {:?}", other),
        }
        assert!(a_rx.try_recv().is_err());
    }
}
