use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration as ChronoDuration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::NewRefreshToken,
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = state
        .accounts
        .find_user_by_username(payload.username.trim())
        .await?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        tracing::info!(username = %user.username, "login rejected");
        return Err(AppError::unauthorized());
    }

    let response = issue_tokens(&state, user.id, &user.username).await?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(response))
}

/// Exchanges a refresh token for a new pair. The presented token is revoked,
/// so replaying it fails.
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let hashed = hash_refresh_token(payload.refresh_token.trim());
    let user_id = state
        .accounts
        .consume_refresh_token(&hashed, Utc::now())
        .await?
        .ok_or_else(AppError::unauthorized)?;

    let user = state
        .accounts
        .find_user(user_id)
        .await?
        .ok_or_else(AppError::unauthorized)?;

    Ok(Json(issue_tokens(&state, user.id, &user.username).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<LogoutRequest>>,
) -> AppResult<StatusCode> {
    let now = Utc::now();
    let presented = payload
        .and_then(|Json(body)| body.refresh_token)
        .map(|token| hash_refresh_token(token.trim()));

    let mut revoked = 0;
    if let Some(hashed) = presented.as_deref() {
        revoked = state
            .accounts
            .revoke_refresh_tokens(user.user_id, Some(hashed), now)
            .await?;
    }
    if revoked == 0 {
        revoked = state
            .accounts
            .revoke_refresh_tokens(user.user_id, None, now)
            .await?;
    }

    tracing::info!(user_id = %user.user_id, revoked, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

async fn issue_tokens(state: &AppState, user_id: Uuid, username: &str) -> AppResult<TokenResponse> {
    let access_token = state.jwt.generate_token(user_id, username)?;

    let now = Utc::now();
    let refresh_value = generate_refresh_token();
    state
        .accounts
        .insert_refresh_token(NewRefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_refresh_token(&refresh_value),
            issued_at: now.naive_utc(),
            expires_at: (now + ChronoDuration::days(state.config.refresh_token_expiry_days))
                .naive_utc(),
        })
        .await?;

    Ok(TokenResponse {
        access_token,
        refresh_token: refresh_value,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in_seconds(),
    })
}

pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
