use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use parley_db::models::ContainerRef;
use parley_services::{
    SendTarget,
    views::{ContainerView, MessageView},
};
use serde::Deserialize;
use validator::Validate;

use super::{PageQuery, message::MessageBody, parse_id, parse_ids};
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<ContainerView>), ApiError> {
    body.validate()?;
    let member_ids = parse_ids(&body.member_ids, "member_id")?;

    let group = state
        .containers
        .create_group(auth.user_id, body.name, body.description, member_ids)
        .await?;

    if let Some(id) = group.id {
        for member in &group.members {
            state.presence.join_room_if_online(id, member.user_id);
        }
    }
    Ok((StatusCode::CREATED, Json(ContainerView::from(&group))))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ContainerView>>, ApiError> {
    let groups = state.containers.groups_for(auth.user_id).await?;
    Ok(Json(groups.iter().map(ContainerView::from).collect()))
}

pub async fn join(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let gid = parse_id(&group_id, "group_id")?;
    state.containers.join_group(gid, auth.user_id).await?;
    state.presence.join_room_if_online(gid, auth.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let gid = parse_id(&group_id, "group_id")?;
    if !state.containers.leave_group(gid, auth.user_id).await? {
        return Err(ApiError::NotFound("Not a member of this group".to_string()));
    }
    state.presence.leave_room(gid, auth.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let container = ContainerRef::Group(parse_id(&group_id, "group_id")?);
    state.containers.ensure_member(container, auth.user_id).await?;

    let page = state
        .messages
        .find_page(container, query.cursor()?, query.limit)
        .await?;
    Ok(Json(page.iter().map(MessageView::from).collect()))
}

pub async fn send(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let gid = parse_id(&group_id, "group_id")?;
    let payload = body.into_send(SendTarget::Group(gid))?;

    let message = state.dispatcher.send(auth.request(payload)).await?;
    Ok((StatusCode::CREATED, Json(MessageView::from(&message))))
}
