use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct PushTokenRequest {
    #[validate(length(min = 1, max = 4096))]
    pub token: String,
}

/// Re-adding a known token is a no-op.
pub async fn add_push_token(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<PushTokenRequest>,
) -> Result<StatusCode, ApiError> {
    body.validate()?;
    let added = state.users.add_push_token(auth.user_id, &body.token).await?;
    Ok(if added { StatusCode::CREATED } else { StatusCode::OK })
}

pub async fn remove_push_token(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .users
        .remove_push_tokens(auth.user_id, &[token])
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn online(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Json<serde_json::Value> {
    let user_ids: Vec<String> = state
        .presence
        .online_user_ids()
        .iter()
        .map(|id| id.to_hex())
        .collect();
    Json(serde_json::json!({ "user_ids": user_ids }))
}
