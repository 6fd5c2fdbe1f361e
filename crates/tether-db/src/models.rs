//! Database row types; these map directly to SQLite rows.
//! Distinct from the tether-types API models to keep the DB layer
//! independent; the API crate converts at its boundary.

use chrono::{DateTime, Utc};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub account_type: String,
    pub partner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub kind: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub voice_duration: Option<f64>,
    pub delivered: bool,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct ChatRow {
    pub id: String,
    pub user_lo: String,
    pub user_hi: String,
    pub is_private_room: bool,
    pub wallpaper: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

impl ChatRow {
    /// The participant that isn't `user_id`, by pair membership.
    pub fn other_participant(&self, user_id: &str) -> &str {
        if self.user_lo == user_id {
            &self.user_hi
        } else {
            &self.user_lo
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user_lo == user_id || self.user_hi == user_id
    }
}

pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}
