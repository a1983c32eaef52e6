use axum::{Json, extract::State};
use parley_db::models::{MessageReference, ReferenceKind};
use parley_services::{MarkSeen, SendMessage, SendTarget, views::MessageView};
use serde::Deserialize;

use super::{ContainerRefBody, parse_id, parse_ids};
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

/// Message fields common to every send endpoint.
#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    #[serde(default)]
    pub file_urls: Vec<String>,
    pub references: Option<ReferenceBody>,
}

impl MessageBody {
    pub fn into_send(self, target: SendTarget) -> Result<SendMessage, ApiError> {
        let references = self.references.as_ref().map(ReferenceBody::parse).transpose()?;
        Ok(SendMessage {
            target,
            content: self.content,
            photo_urls: self.photo_urls,
            file_urls: self.file_urls,
            references,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ReferenceBody {
    pub kind: ReferenceKind,
    pub message_id: Option<String>,
    pub channel_id: Option<String>,
}

impl ReferenceBody {
    pub fn parse(&self) -> Result<MessageReference, ApiError> {
        Ok(MessageReference {
            kind: self.kind,
            message_id: self
                .message_id
                .as_deref()
                .map(|id| parse_id(id, "message_id"))
                .transpose()?,
            channel_id: self
                .channel_id
                .as_deref()
                .map(|id| parse_id(id, "channel_id"))
                .transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkSeenRequest {
    #[serde(default)]
    pub message_ids: Vec<String>,
    pub container: Option<ContainerRefBody>,
}

impl MarkSeenRequest {
    pub fn parse(&self) -> Result<MarkSeen, ApiError> {
        Ok(MarkSeen {
            message_ids: parse_ids(&self.message_ids, "message_id")?,
            container: self.container.as_ref().map(ContainerRefBody::parse).transpose()?,
        })
    }
}

/// Returns only the messages this call changed.
pub async fn mark_seen(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<MarkSeenRequest>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let updated = state.receipts.mark_seen(auth.request(body.parse()?)).await?;
    Ok(Json(updated.iter().map(MessageView::from).collect()))
}
