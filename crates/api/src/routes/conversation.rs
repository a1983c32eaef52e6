use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use parley_db::models::{ContainerRef, Conversation};
use parley_services::{
    SendTarget,
    views::{ContainerView, MessageView},
};
use serde::{Deserialize, Serialize};

use super::{PageQuery, message::MessageBody, parse_id};
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

/// Messages embedded per conversation in the list view.
const LATEST_PER_CONVERSATION: i64 = 15;

#[derive(Debug, Deserialize)]
pub struct SendDirectRequest {
    pub conversation_id: Option<String>,
    pub receiver_id: Option<String>,
    #[serde(flatten)]
    pub message: MessageBody,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    #[serde(flatten)]
    pub conversation: ContainerView,
    pub messages: Vec<MessageView>,
}

/// Conversations by most recent activity, each with its newest messages.
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    let conversations = state.containers.conversations_for(auth.user_id).await?;

    let mut items = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        items.push(with_latest(&state, conversation).await?);
    }
    Ok(Json(items))
}

pub async fn messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let cid = parse_id(&conversation_id, "conversation_id")?;
    state
        .containers
        .find_conversation_for(cid, auth.user_id)
        .await?;

    let page = state
        .messages
        .find_page(ContainerRef::Conversation(cid), query.cursor()?, query.limit)
        .await?;
    Ok(Json(page.iter().map(MessageView::from).collect()))
}

pub async fn send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendDirectRequest>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let target = SendTarget::Conversation {
        conversation_id: body
            .conversation_id
            .as_deref()
            .map(|id| parse_id(id, "conversation_id"))
            .transpose()?,
        receiver_id: body
            .receiver_id
            .as_deref()
            .map(|id| parse_id(id, "receiver_id"))
            .transpose()?,
    };
    let payload = body.message.into_send(target)?;
    let message = state.dispatcher.send(auth.request(payload)).await?;
    Ok((StatusCode::CREATED, Json(MessageView::from(&message))))
}

async fn with_latest(
    state: &AppState,
    conversation: &Conversation,
) -> Result<ConversationResponse, ApiError> {
    let messages = match conversation.id {
        Some(id) => {
            state
                .messages
                .latest_in(ContainerRef::Conversation(id), LATEST_PER_CONVERSATION)
                .await?
        }
        None => Vec::new(),
    };

    Ok(ConversationResponse {
        conversation: ContainerView::from(conversation),
        messages: messages.iter().map(MessageView::from).collect(),
    })
}
