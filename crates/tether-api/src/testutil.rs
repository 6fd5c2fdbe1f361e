use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use tether_db::Database;
use tether_db::models::UserRow;
use tether_gateway::dispatcher::Dispatcher;
use tether_types::api::Claims;
use tether_types::models::{AccountType, User};

use crate::state::{AppState, AppStateInner};

pub(crate) fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("in-memory db"),
        dispatcher: Dispatcher::new(),
        jwt_secret: "test-secret".to_string(),
    })
}

/// Insert a user directly, bypassing signup. When seeding a paired user,
/// seed the partner first (foreign key) and link it back separately if the
/// test needs symmetry.
pub(crate) fn seed_user(
    state: &AppState,
    username: &str,
    account_type: AccountType,
    partner_id: Option<Uuid>,
) -> User {
    let id = Uuid::new_v4();
    let now = Utc::now();
    state
        .db
        .create_user(&UserRow {
            id: id.to_string(),
            username: username.to_string(),
            password: "$argon2id$test-only".to_string(),
            display_name: username.to_string(),
            avatar_url: None,
            account_type: account_type.as_str().to_string(),
            partner_id: partner_id.map(|p| p.to_string()),
            created_at: now,
            last_seen: now,
        })
        .expect("seed user");

    User {
        id,
        username: username.to_string(),
        display_name: username.to_string(),
        avatar_url: None,
        account_type,
        partner_id,
        created_at: now,
        last_seen: now,
    }
}

pub(crate) fn claims_for(user: &User) -> Claims {
    Claims {
        sub: user.id,
        username: user.username.clone(),
        exp: usize::MAX,
    }
}
