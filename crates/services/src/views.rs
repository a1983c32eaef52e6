//! JSON shapes shared by HTTP responses and realtime event payloads.
//! Ids are hex strings, timestamps RFC 3339.

use bson::oid::ObjectId;
use parley_db::models::{
    Channel, Comment, ContainerRef, Conversation, Group, LastMessage, Member, Message,
    MessageReference,
};
use serde::Serialize;

use crate::error::{ChatError, ChatResult};

#[derive(Debug, Clone, Serialize)]
pub struct ContainerRefView {
    pub kind: &'static str,
    pub id: String,
}

impl From<ContainerRef> for ContainerRefView {
    fn from(c: ContainerRef) -> Self {
        Self {
            kind: c.kind().as_str(),
            id: c.id().to_hex(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceView {
    pub kind: parley_db::models::ReferenceKind,
    pub message_id: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub status: &'static str,
    pub seen_user_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: String,
    pub container: ContainerRefView,
    pub sender_id: String,
    pub content: String,
    pub photo_urls: Vec<String>,
    pub file_urls: Vec<String>,
    pub references: Option<ReferenceView>,
    pub status: StatusView,
    pub created_at: String,
}

impl From<&Message> for MessageView {
    fn from(m: &Message) -> Self {
        Self {
            id: hex(m.id),
            container: m.container.into(),
            sender_id: m.sender_id.to_hex(),
            content: m.content.clone(),
            photo_urls: m.photo_urls.clone(),
            file_urls: m.file_urls.clone(),
            references: m.references.as_ref().map(reference_view),
            status: StatusView {
                status: m.status.status.as_str(),
                seen_user_ids: m.status.seen_user_ids.iter().map(|id| id.to_hex()).collect(),
            },
            created_at: m.created_at.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: String,
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: String,
}

impl From<&Comment> for CommentView {
    fn from(c: &Comment) -> Self {
        Self {
            id: hex(c.id),
            message_id: c.message_id.to_hex(),
            channel_id: c.channel_id.to_hex(),
            author_id: c.author_id.to_hex(),
            content: c.content.clone(),
            created_at: c.created_at.try_to_rfc3339_string().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LastMessageView {
    pub message_id: String,
    pub sender_id: String,
    pub preview: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerView {
    pub id: String,
    pub kind: &'static str,
    pub name: Option<String>,
    pub description: Option<String>,
    pub member_ids: Vec<String>,
    pub admin_ids: Vec<String>,
    pub last_message: Option<LastMessageView>,
    pub last_activity: Option<String>,
}

impl From<&Conversation> for ContainerView {
    fn from(c: &Conversation) -> Self {
        Self {
            id: hex(c.id),
            kind: "conversation",
            name: None,
            description: None,
            member_ids: member_hex(&c.members),
            admin_ids: Vec::new(),
            last_message: c.last_message.as_ref().map(last_message_view),
            last_activity: c.last_activity.and_then(|t| t.try_to_rfc3339_string().ok()),
        }
    }
}

impl From<&Group> for ContainerView {
    fn from(g: &Group) -> Self {
        Self {
            id: hex(g.id),
            kind: "group",
            name: Some(g.name.clone()),
            description: g.description.clone(),
            member_ids: member_hex(&g.members),
            admin_ids: vec![g.creator_id.to_hex()],
            last_message: g.last_message.as_ref().map(last_message_view),
            last_activity: g.last_activity.and_then(|t| t.try_to_rfc3339_string().ok()),
        }
    }
}

impl From<&Channel> for ContainerView {
    fn from(c: &Channel) -> Self {
        Self {
            id: hex(c.id),
            kind: "channel",
            name: Some(c.name.clone()),
            description: c.description.clone(),
            member_ids: member_hex(&c.members),
            admin_ids: c.admin_ids.iter().map(|id| id.to_hex()).collect(),
            last_message: c.last_message.as_ref().map(last_message_view),
            last_activity: c.last_activity.and_then(|t| t.try_to_rfc3339_string().ok()),
        }
    }
}

/// Encodes a realtime payload. A failure surfaces as a background error
/// instead of an empty event.
pub fn event_payload<T: Serialize>(view: &T) -> ChatResult<serde_json::Value> {
    serde_json::to_value(view)
        .map_err(|e| ChatError::Background(format!("Failed to encode event payload: {e}")))
}

pub fn messages_json(messages: &[Message]) -> ChatResult<serde_json::Value> {
    let views: Vec<MessageView> = messages.iter().map(MessageView::from).collect();
    event_payload(&views)
}

fn reference_view(r: &MessageReference) -> ReferenceView {
    ReferenceView {
        kind: r.kind,
        message_id: r.message_id.map(|id| id.to_hex()),
        channel_id: r.channel_id.map(|id| id.to_hex()),
    }
}

fn last_message_view(l: &LastMessage) -> LastMessageView {
    LastMessageView {
        message_id: l.message_id.to_hex(),
        sender_id: l.sender_id.to_hex(),
        preview: l.preview.clone(),
        created_at: l.created_at.try_to_rfc3339_string().unwrap_or_default(),
    }
}

fn member_hex(members: &[Member]) -> Vec<String> {
    members.iter().map(|m| m.user_id.to_hex()).collect()
}

fn hex(id: Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}
