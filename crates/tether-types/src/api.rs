use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountType, Message, MessageKind, User};

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the WebSocket upgrade
/// path. Canonical definition lives here to avoid duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub account_type: AccountType,
    /// Required when signing up a paired account: the username of the
    /// counterpart to link to.
    pub partner_username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: User,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdateRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Another user as shown in search results and chat summaries.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub voice_duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    50
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionRequest {
    /// `None` (or empty) removes the caller's reaction.
    pub emoji: Option<String>,
}

// -- Chats --

#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub participant: PeerInfo,
    pub last_message: Option<Message>,
    pub wallpaper: Option<String>,
    pub is_private_room: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NicknameRequest {
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WallpaperRequest {
    pub wallpaper_url: String,
}
