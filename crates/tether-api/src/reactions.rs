use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use tether_types::api::{Claims, ReactionRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// Set or clear the caller's reaction on a message. Only the two
/// participants of the message may react; a write overwrites the caller's
/// prior reaction, an absent (or empty) emoji removes it. The other
/// participant is notified best-effort, with an empty emoji meaning
/// "removed".
pub async fn set_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mid = message_id.to_string();
    let message = state
        .with_db(move |db| db.get_message(&mid))
        .await?
        .ok_or(ApiError::NotFound("Message not found"))?;

    let actor = claims.sub.to_string();
    if actor != message.sender_id && actor != message.receiver_id {
        return Err(ApiError::Forbidden("Not a participant of this message"));
    }

    let emoji = req.emoji.filter(|e| !e.is_empty());

    let mid = message_id.to_string();
    let actor_id = actor.clone();
    let emoji_db = emoji.clone();
    state
        .with_db(move |db| match emoji_db {
            Some(emoji) => db.set_reaction(&mid, &actor_id, &emoji),
            None => db.clear_reaction(&mid, &actor_id).map(|_| ()),
        })
        .await?;

    let other = if actor == message.sender_id {
        &message.receiver_id
    } else {
        &message.sender_id
    };
    let other: Uuid = other
        .parse()
        .map_err(|_| anyhow::anyhow!("corrupt participant id on message {}", message.id))?;

    state
        .dispatcher
        .notify_reaction(other, message_id, claims.sub, emoji.unwrap_or_default())
        .await;

    Ok(Json(serde_json::json!({ "detail": "Reaction updated" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{claims_for, seed_user, test_state};
    use chrono::Utc;
    use tether_db::models::MessageRow;
    use tether_types::events::RealtimeEvent;
    use tether_types::models::AccountType;

    fn seed_message(state: &AppState, sender: Uuid, receiver: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        state
            .db
            .insert_message(&MessageRow {
                id: id.to_string(),
                sender_id: sender.to_string(),
                receiver_id: receiver.to_string(),
                content: "hi".to_string(),
                kind: "text".to_string(),
                file_url: None,
                file_name: None,
                file_size: None,
                voice_duration: None,
                delivered: true,
                read: false,
                read_at: None,
                created_at: Utc::now(),
            })
            .unwrap();
        id
    }

    #[tokio::test]
    async fn only_participants_may_react() {
        let state = test_state();
        let alice = seed_user(&state, "alice", AccountType::Open, None);
        let bob = seed_user(&state, "bob", AccountType::Open, None);
        let eve = seed_user(&state, "eve", AccountType::Open, None);
        let msg = seed_message(&state, alice.id, bob.id);

        let err = set_reaction(
            State(state.clone()),
            Path(msg),
            Extension(claims_for(&eve)),
            Json(ReactionRequest {
                emoji: Some("👀".into()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn overwrite_then_remove_notifies_the_other_side() {
        let state = test_state();
        let alice = seed_user(&state, "alice", AccountType::Open, None);
        let bob = seed_user(&state, "bob", AccountType::Open, None);
        let msg = seed_message(&state, alice.id, bob.id);

        let (_conn, mut alice_rx) = state.dispatcher.connect(alice.id).await;

        for emoji in ["👍", "😂"] {
            set_reaction(
                State(state.clone()),
                Path(msg),
                Extension(claims_for(&bob)),
                Json(ReactionRequest {
                    emoji: Some(emoji.into()),
                }),
            )
            .await
            .unwrap();
        }

        // One entry for bob, last write wins.
        let reactions = state.db.reactions_for_messages(&[msg.to_string()]).unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emoji, "😂");

        match alice_rx.try_recv().unwrap() {
            RealtimeEvent::Reaction { emoji, user_id, .. } => {
                assert_eq!(emoji, "👍");
                assert_eq!(user_id, bob.id);
            }
            other => panic!("expected reaction, got {:?}", other),
        }

        set_reaction(
            State(state.clone()),
            Path(msg),
            Extension(claims_for(&bob)),
            Json(ReactionRequest { emoji: None }),
        )
        .await
        .unwrap();

        assert!(state.db.reactions_for_messages(&[msg.to_string()]).unwrap().is_empty());

        // Skip the overwrite event; the removal arrives as an empty emoji.
        alice_rx.try_recv().unwrap();
        match alice_rx.try_recv().unwrap() {
            RealtimeEvent::Reaction { emoji, .. } => assert_eq!(emoji, ""),
            other => panic!("expected reaction, got {:?}", other),
        }
    }
}
