use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use parley_db::models::ContainerRef;
use parley_services::{
    NewComment, SendTarget,
    views::{CommentView, ContainerView, MessageView},
};
use serde::Deserialize;
use validator::Validate;

use super::{PageQuery, message::MessageBody, parse_id};
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChannelRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<ContainerView>), ApiError> {
    body.validate()?;
    let channel = state
        .containers
        .create_channel(auth.user_id, body.name, body.description)
        .await?;

    if let Some(id) = channel.id {
        state.presence.join_room_if_online(id, auth.user_id);
    }
    Ok((StatusCode::CREATED, Json(ContainerView::from(&channel))))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ContainerView>>, ApiError> {
    let channels = state.containers.channels_for(auth.user_id).await?;
    Ok(Json(channels.iter().map(ContainerView::from).collect()))
}

/// Admin only. Adding an existing member is a conflict.
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(channel_id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Result<StatusCode, ApiError> {
    let cid = parse_id(&channel_id, "channel_id")?;
    let user_id = parse_id(&body.user_id, "user_id")?;

    state
        .containers
        .add_channel_member(cid, auth.user_id, user_id)
        .await?;
    state.presence.join_room_if_online(cid, user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(channel_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let container = ContainerRef::Channel(parse_id(&channel_id, "channel_id")?);
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
    Path(channel_id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let cid = parse_id(&channel_id, "channel_id")?;
    let payload = body.into_send(SendTarget::Channel(cid))?;

    let message = state.dispatcher.send(auth.request(payload)).await?;
    Ok((StatusCode::CREATED, Json(MessageView::from(&message))))
}

pub async fn comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> Result<(StatusCode, Json<CommentView>), ApiError> {
    body.validate()?;
    let payload = NewComment {
        message_id: parse_id(&message_id, "message_id")?,
        content: body.content,
    };

    let comment = state.dispatcher.comment(auth.request(payload)).await?;
    Ok((StatusCode::CREATED, Json(CommentView::from(&comment))))
}

pub async fn comments(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<Vec<CommentView>>, ApiError> {
    let mid = parse_id(&message_id, "message_id")?;
    let parent = state.messages.base.find_by_id(mid).await?;
    state
        .containers
        .ensure_member(parent.container, auth.user_id)
        .await?;

    let comments = state.comments.list_for(mid).await?;
    Ok(Json(comments.iter().map(CommentView::from).collect()))
}
