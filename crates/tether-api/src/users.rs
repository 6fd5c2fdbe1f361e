use axum::{Extension, Json, extract::Query, extract::State};
use serde::Deserialize;

use tether_gateway::dispatcher::Dispatcher;
use tether_types::api::{Claims, PeerInfo, ProfileUpdateRequest};
use tether_types::models::{AccountType, User};

use crate::convert::{load_user, user_from_row};
use crate::error::ApiError;
use crate::state::AppState;

/// Project a user into the peer shape shown to others, with live presence
/// layered over the stored last-seen.
pub(crate) async fn peer_info(
    dispatcher: &Dispatcher,
    user: &User,
    display_name_override: Option<String>,
) -> PeerInfo {
    let presence = dispatcher.presence();
    let is_online = presence.is_online(user.id).await;
    let last_seen = presence.last_seen(user.id).await.unwrap_or(user.last_seen);

    PeerInfo {
        id: user.id,
        username: user.username.clone(),
        display_name: display_name_override.unwrap_or_else(|| user.display_name.clone()),
        avatar_url: user.avatar_url.clone(),
        is_online,
        last_seen,
    }
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let user = load_user(&state, claims.sub, ApiError::Unauthorized).await?;
    Ok(Json(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<User>, ApiError> {
    let user = load_user(&state, claims.sub, ApiError::Unauthorized).await?;

    let id = user.id.to_string();
    let updated = state
        .with_db(move |db| {
            db.update_profile(&id, req.display_name.as_deref(), req.avatar_url.as_deref())?;
            db.get_user_by_id(&id)?
                .ok_or_else(|| anyhow::anyhow!("user vanished during profile update"))
        })
        .await?;

    Ok(Json(user_from_row(updated)?))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// Substring search over usernames. Only open accounts are discoverable,
/// and paired callers see nothing at all.
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<PeerInfo>>, ApiError> {
    let caller = load_user(&state, claims.sub, ApiError::Unauthorized).await?;

    if caller.account_type == AccountType::Paired {
        return Ok(Json(vec![]));
    }

    let caller_id = caller.id.to_string();
    let rows = state
        .with_db(move |db| db.search_open_users(&query.q, &caller_id, 20))
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let user = user_from_row(row)?;
        results.push(peer_info(&state.dispatcher, &user, None).await);
    }

    Ok(Json(results))
}
