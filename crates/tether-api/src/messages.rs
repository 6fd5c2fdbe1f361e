use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

use tether_db::models::MessageRow;
use tether_types::api::{Claims, HistoryQuery, SendMessageRequest};
use tether_types::events::SenderInfo;
use tether_types::models::{AccountType, Message};

use crate::convert::{load_user, message_from_row, reaction_maps};
use crate::error::ApiError;
use crate::policy::can_exchange;
use crate::state::AppState;

/// The send pipeline: resolve the receiver, gate on the exchange policy,
/// persist with `delivered = true` (acceptance, not transport confirmation),
/// upsert the pair's chat, then push best-effort. The persisted message is
/// returned whatever happened to the push; a dropped push is not an error,
/// and nothing is dispatched unless persistence succeeded first.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let sender = load_user(&state, claims.sub, ApiError::Unauthorized).await?;
    let receiver = load_user(&state, req.receiver_id, ApiError::NotFound("Receiver not found")).await?;

    // Messaging yourself (notes to self) bypasses the exchange policy.
    if sender.id != receiver.id && !can_exchange(&sender, &receiver) {
        return Err(ApiError::Forbidden("You cannot message this user"));
    }

    let message = Message {
        id: Uuid::new_v4(),
        sender_id: sender.id,
        receiver_id: receiver.id,
        content: req.content,
        kind: req.kind,
        file_url: req.file_url,
        file_name: req.file_name,
        file_size: req.file_size,
        voice_duration: req.voice_duration,
        created_at: Utc::now(),
        delivered: true,
        read: false,
        read_at: None,
        reactions: HashMap::new(),
    };

    let row = MessageRow {
        id: message.id.to_string(),
        sender_id: message.sender_id.to_string(),
        receiver_id: message.receiver_id.to_string(),
        content: message.content.clone(),
        kind: message.kind.as_str().to_string(),
        file_url: message.file_url.clone(),
        file_name: message.file_name.clone(),
        file_size: message.file_size.map(|s| s as i64),
        voice_duration: message.voice_duration,
        delivered: true,
        read: false,
        read_at: None,
        created_at: message.created_at,
    };

    let is_private = sender.account_type == AccountType::Paired;
    let chat_candidate = Uuid::new_v4().to_string();
    state
        .with_db(move |db| db.store_message(&row, &chat_candidate, is_private).map(|_| ()))
        .await?;

    let sender_info = SenderInfo {
        id: sender.id,
        username: sender.username.clone(),
        display_name: sender.display_name.clone(),
        avatar_url: sender.avatar_url.clone(),
    };
    state.dispatcher.notify_message(message.clone(), sender_info).await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Point-in-time history snapshot between the caller and another user.
/// The window paginates from the most recent message backward; the page is
/// returned in ascending timestamp order for display. As a side effect,
/// everything unread from the other user to the caller is marked read, and
/// a read receipt is pushed to them regardless of whether anything changed.
pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let requester = load_user(&state, claims.sub, ApiError::Unauthorized).await?;
    let other = load_user(&state, user_id, ApiError::NotFound("User not found")).await?;

    // Same predicate as the send path, self chats included.
    if requester.id != other.id && !can_exchange(&requester, &other) {
        return Err(ApiError::Forbidden("You cannot view this conversation"));
    }

    let me = requester.id.to_string();
    let them = other.id.to_string();
    let skip = query.skip;
    let limit = query.limit.min(200);
    let now = Utc::now();

    let (rows, reaction_rows) = state
        .with_db(move |db| {
            let rows = db.history_page(&me, &them, skip, limit)?;
            db.mark_read(&them, &me, now)?;
            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let reactions = db.reactions_for_messages(&ids)?;
            Ok((rows, reactions))
        })
        .await?;

    let mut maps = reaction_maps(reaction_rows)?;
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows.into_iter().rev() {
        let reactions = maps.remove(&row.id).unwrap_or_default();
        messages.push(message_from_row(row, reactions)?);
    }

    state
        .dispatcher
        .notify_read_receipt(other.id, requester.id)
        .await;

    Ok(Json(messages))
}
