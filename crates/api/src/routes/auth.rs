use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
};
use parley_db::models::User;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32))]
    pub username: String,
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(url)]
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), ApiError> {
    body.validate()?;
    let password_hash = state.auth.hash_password(&body.password)?;

    let user = state
        .users
        .create(body.username, body.display_name, body.avatar, password_hash)
        .await?;

    let (headers, response) = issue_tokens(&state, &user)?;
    Ok((StatusCode::CREATED, headers, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    let user = state
        .users
        .find_by_username(&body.username)
        .await
        .map_err(|_| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let password_hash = user
        .password_hash
        .as_ref()
        .ok_or_else(|| ApiError::Unauthorized("No password set".to_string()))?;

    if !state.auth.verify_password(&body.password, password_hash)? {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let (headers, response) = issue_tokens(&state, &user)?;
    Ok((headers, Json(response)))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    let claims = state.auth.verify_refresh_token(&body.refresh_token)?;
    let user_id = super::parse_id(&claims.sub, "user id")?;
    let user = state.users.base.find_by_id(user_id).await?;

    let (headers, response) = issue_tokens(&state, &user)?;
    Ok((headers, Json(response)))
}

pub async fn logout() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("access_token=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"),
    );
    headers
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.users.base.find_by_id(auth.user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

fn issue_tokens(state: &AppState, user: &User) -> Result<(HeaderMap, AuthResponse), ApiError> {
    let user_id = user
        .id
        .ok_or_else(|| ApiError::Internal("User without id".to_string()))?;
    let tokens = state.auth.generate_tokens(user_id, &user.username)?;

    let mut headers = HeaderMap::new();
    let cookie = format!(
        "access_token={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        tokens.access_token, tokens.expires_in
    );
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    headers.insert(header::SET_COOKIE, cookie);

    let response = AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
        user: UserResponse::from(user),
    };
    Ok((headers, response))
}
