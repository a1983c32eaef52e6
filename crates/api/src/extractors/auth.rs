use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use bson::oid::ObjectId;
use parley_services::{AuthenticatedRequest, auth::Claims};

use crate::{error::ApiError, state::AppState};

/// Caller identity from the bearer token or the `access_token` cookie.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: ObjectId,
    pub username: String,
    pub claims: Claims,
}

impl AuthUser {
    /// Pairs a request body with the verified caller.
    pub fn request<T>(&self, payload: T) -> AuthenticatedRequest<T> {
        AuthenticatedRequest::new(self.user_id, payload)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or_else(|| ApiError::Unauthorized("No token provided".to_string()))?;

        let claims = app_state.auth.verify_access_token(&token)?;
        let user_id = ObjectId::parse_str(&claims.sub)
            .map_err(|_| ApiError::Unauthorized("Invalid user ID in token".to_string()))?;

        Ok(AuthUser {
            user_id,
            username: claims.username.clone(),
            claims,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|c| c.trim().strip_prefix("access_token=").map(|s| s.to_string()))
        })
}
