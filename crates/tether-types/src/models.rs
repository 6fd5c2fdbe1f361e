use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account classes. An `Open` account may message any other open account;
/// a `Paired` account is locked to exactly one counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Open,
    Paired,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Paired => "paired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "paired" => Some(Self::Paired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Voice,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Voice => "voice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }
}

/// A user as the policy and pipeline layers see it. The password hash stays
/// in the database layer and never appears here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub account_type: AccountType,
    /// Set iff `account_type` is `Paired`. Symmetry (A.partner == B implies
    /// B.partner == A) is established at signup and relied on by the policy.
    pub partner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A persisted direct message. Append-only except for the delivery/read
/// flags and the reaction map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub voice_duration: Option<f64>,
    pub created_at: DateTime<Utc>,
    /// Accepted by the pipeline; says nothing about live push.
    pub delivered: bool,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    /// Reactor id -> emoji. The map type itself guarantees at most one
    /// reaction per reactor; writes overwrite.
    pub reactions: HashMap<Uuid, String>,
}
