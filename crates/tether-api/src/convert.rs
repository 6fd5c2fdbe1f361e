//! Boundary between the string-keyed database rows and the typed API
//! models. Corrupt rows surface as internal errors rather than panics.

use std::collections::HashMap;

use anyhow::{Context, anyhow};
use uuid::Uuid;

use tether_db::models::{MessageRow, ReactionRow, UserRow};
use tether_types::models::{AccountType, Message, MessageKind, User};

use crate::error::ApiError;
use crate::state::AppState;

pub fn user_from_row(row: UserRow) -> anyhow::Result<User> {
    Ok(User {
        id: row.id.parse().context("corrupt user id")?,
        username: row.username,
        display_name: row.display_name,
        avatar_url: row.avatar_url,
        account_type: AccountType::parse(&row.account_type)
            .ok_or_else(|| anyhow!("corrupt account_type '{}'", row.account_type))?,
        partner_id: row
            .partner_id
            .map(|p| p.parse().context("corrupt partner id"))
            .transpose()?,
        created_at: row.created_at,
        last_seen: row.last_seen,
    })
}

pub fn message_from_row(row: MessageRow, reactions: HashMap<Uuid, String>) -> anyhow::Result<Message> {
    Ok(Message {
        id: row.id.parse().context("corrupt message id")?,
        sender_id: row.sender_id.parse().context("corrupt sender id")?,
        receiver_id: row.receiver_id.parse().context("corrupt receiver id")?,
        content: row.content,
        kind: MessageKind::parse(&row.kind).ok_or_else(|| anyhow!("corrupt kind '{}'", row.kind))?,
        file_url: row.file_url,
        file_name: row.file_name,
        file_size: row.file_size.map(|s| s as u64),
        voice_duration: row.voice_duration,
        created_at: row.created_at,
        delivered: row.delivered,
        read: row.read,
        read_at: row.read_at,
        reactions,
    })
}

/// Group reaction rows by message id into reactor -> emoji maps.
pub fn reaction_maps(rows: Vec<ReactionRow>) -> anyhow::Result<HashMap<String, HashMap<Uuid, String>>> {
    let mut grouped: HashMap<String, HashMap<Uuid, String>> = HashMap::new();
    for row in rows {
        let reactor: Uuid = row.user_id.parse().context("corrupt reactor id")?;
        grouped.entry(row.message_id).or_default().insert(reactor, row.emoji);
    }
    Ok(grouped)
}

/// Resolve a user by id, yielding `missing` when absent. Callers pick the
/// error: `Unauthorized` for the authenticated caller's own id, `NotFound`
/// for anyone they name.
pub async fn load_user(state: &AppState, id: Uuid, missing: ApiError) -> Result<User, ApiError> {
    let row = state
        .with_db(move |db| db.get_user_by_id(&id.to_string()))
        .await?;
    match row {
        Some(row) => Ok(user_from_row(row)?),
        None => Err(missing),
    }
}
