use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Minimal sender display fields carried on a pushed message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Events pushed to live connections. Serialized to JSON at the WebSocket
/// boundary only; everything upstream handles the typed variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// A new message addressed to the receiving connection.
    Message { data: Message, sender: SenderInfo },

    /// A reaction changed on a message the receiver participates in.
    /// An empty emoji means the reactor removed their reaction.
    Reaction {
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },

    /// The named user just marked their unread messages from the receiver
    /// as read. Sent even when nothing was actually unread.
    ReadReceipt { chat_user_id: Uuid },

    /// A user came online or went offline.
    UserStatus {
        user_id: Uuid,
        is_online: bool,
        last_seen: DateTime<Utc>,
    },
}
