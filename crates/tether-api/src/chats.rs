use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use tether_db::models::ChatRow;
use tether_types::api::{ChatSummary, Claims, NicknameRequest, WallpaperRequest};

use crate::convert::{load_user, message_from_row, reaction_maps, user_from_row};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::peer_info;

/// The caller's chats, most recently active first. Each summary carries the
/// other participant (with any per-chat nickname override and live
/// presence), the latest message with its reactions, and the chat's display
/// metadata.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    let caller = load_user(&state, claims.sub, ApiError::Unauthorized).await?;

    let caller_id = caller.id.to_string();
    let raw = state
        .with_db(move |db| {
            let chats = db.chats_for_user(&caller_id)?;
            let mut out = Vec::with_capacity(chats.len());
            for chat in chats {
                let other_id = chat.other_participant(&caller_id).to_string();
                let Some(other) = db.get_user_by_id(&other_id)? else {
                    continue;
                };
                let nickname = db.nickname_for(&chat.id, &other_id)?;
                let last = db.last_message_between(&caller_id, &other_id)?;
                let reactions = match &last {
                    Some(msg) => db.reactions_for_messages(std::slice::from_ref(&msg.id))?,
                    None => vec![],
                };
                out.push((chat, other, nickname, last, reactions));
            }
            Ok(out)
        })
        .await?;

    let mut summaries = Vec::with_capacity(raw.len());
    for (chat, other_row, nickname, last_row, reaction_rows) in raw {
        let other = user_from_row(other_row)?;
        let participant = peer_info(&state.dispatcher, &other, nickname).await;

        let last_message = match last_row {
            Some(row) => {
                let mut maps = reaction_maps(reaction_rows)?;
                let reactions = maps.remove(&row.id).unwrap_or_default();
                Some(message_from_row(row, reactions)?)
            }
            None => None,
        };

        summaries.push(ChatSummary {
            id: chat
                .id
                .parse()
                .map_err(|_| anyhow::anyhow!("corrupt chat id '{}'", chat.id))?,
            participant,
            last_message,
            wallpaper: chat.wallpaper,
            is_private_room: chat.is_private_room,
        });
    }

    Ok(Json(summaries))
}

async fn participant_chat(
    state: &AppState,
    chat_id: Uuid,
    caller: Uuid,
) -> Result<ChatRow, ApiError> {
    let id = chat_id.to_string();
    let chat = state
        .with_db(move |db| db.get_chat(&id))
        .await?
        .ok_or(ApiError::NotFound("Chat not found"))?;

    if !chat.has_participant(&caller.to_string()) {
        return Err(ApiError::Forbidden("Not a participant in this chat"));
    }
    Ok(chat)
}

/// Set the caller's nickname for the other participant of a chat.
pub async fn set_nickname(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NicknameRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chat = participant_chat(&state, chat_id, claims.sub).await?;

    let caller = claims.sub.to_string();
    let other = chat.other_participant(&caller).to_string();
    state
        .with_db(move |db| db.set_nickname(&chat.id, &other, &req.nickname, &caller))
        .await?;

    Ok(Json(serde_json::json!({ "detail": "Nickname updated" })))
}

pub async fn set_wallpaper(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WallpaperRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chat = participant_chat(&state, chat_id, claims.sub).await?;

    state
        .with_db(move |db| db.set_wallpaper(&chat.id, &req.wallpaper_url))
        .await?;

    Ok(Json(serde_json::json!({ "detail": "Wallpaper updated" })))
}
