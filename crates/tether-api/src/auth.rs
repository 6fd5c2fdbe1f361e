use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use tether_db::models::UserRow;
use tether_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest};
use tether_types::models::AccountType;

use crate::convert::user_from_row;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest("Username must be 3-32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters"));
    }

    // Paired accounts link to an existing user at signup. The partner is
    // flipped to paired and linked back, whatever type it had before, and
    // the private room chat is created up front.
    let partner = match req.account_type {
        AccountType::Paired => {
            let partner_username = req
                .partner_username
                .clone()
                .ok_or(ApiError::BadRequest("Partner username required for paired accounts"))?;
            let row = state
                .with_db(move |db| db.get_user_by_username(&partner_username))
                .await?
                .ok_or(ApiError::NotFound("Partner not found"))?;
            Some(user_from_row(row)?)
        }
        AccountType::Open => None,
    };

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let row = UserRow {
        id: user_id.to_string(),
        username: req.username.clone(),
        password: password_hash,
        display_name: req.display_name.clone(),
        avatar_url: None,
        account_type: req.account_type.as_str().to_string(),
        partner_id: partner.as_ref().map(|p| p.id.to_string()),
        created_at: now,
        last_seen: now,
    };

    // Uniqueness is enforced by the schema, not a pre-read; concurrent
    // signups of the same username race to the insert and the loser gets
    // the conflict, never an opaque failure.
    let created = state
        .with_db(move |db| {
            db.create_user(&row)?;
            db.get_user_by_id(&row.id)?
                .ok_or_else(|| anyhow::anyhow!("user vanished after insert"))
        })
        .await;
    let user = match created {
        Ok(row) => user_from_row(row)?,
        Err(ApiError::Internal(err)) if tether_db::is_unique_violation(&err) => {
            return Err(ApiError::Conflict("Username already exists"));
        }
        Err(err) => return Err(err),
    };

    if let Some(partner) = &partner {
        let partner_id = partner.id.to_string();
        let new_id = user_id.to_string();
        let chat_id = Uuid::new_v4().to_string();
        state
            .with_db(move |db| {
                db.link_partner(&partner_id, &new_id)?;
                db.ensure_chat(&chat_id, &new_id, &partner_id, true, now)?;
                Ok(())
            })
            .await?;
    }

    let access_token = create_token(&state.jwt_secret, user.id, &user.username)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            token_type: "bearer".to_string(),
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let username = req.username.clone();
    let row = state
        .with_db(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash =
        PasswordHash::new(&row.password).map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let mut user = user_from_row(row)?;

    let now = Utc::now();
    let id = user.id.to_string();
    state.with_db(move |db| db.touch_last_seen(&id, now)).await?;
    user.last_seen = now;

    let access_token = create_token(&state.jwt_secret, user.id, &user.username)?;

    Ok(Json(AuthResponse {
        access_token,
        token_type: "bearer".to_string(),
        user,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + chrono::Duration::days(7)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
