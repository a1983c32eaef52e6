use bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

/// The three kinds of message container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Conversation,
    Group,
    Channel,
}

impl ContainerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerKind::Conversation => "conversation",
            ContainerKind::Group => "group",
            ContainerKind::Channel => "channel",
        }
    }

    pub fn collection(self) -> &'static str {
        match self {
            ContainerKind::Conversation => super::Conversation::COLLECTION,
            ContainerKind::Group => super::Group::COLLECTION,
            ContainerKind::Channel => super::Channel::COLLECTION,
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "conversation" => Some(ContainerKind::Conversation),
            "group" => Some(ContainerKind::Group),
            "channel" => Some(ContainerKind::Channel),
            _ => None,
        }
    }
}

/// The container a message belongs to. Exactly one, always.
///
/// Stored as `{ kind: "group", id: ObjectId }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ContainerRef {
    Conversation(ObjectId),
    Group(ObjectId),
    Channel(ObjectId),
}

impl ContainerRef {
    pub fn new(kind: ContainerKind, id: ObjectId) -> Self {
        match kind {
            ContainerKind::Conversation => ContainerRef::Conversation(id),
            ContainerKind::Group => ContainerRef::Group(id),
            ContainerKind::Channel => ContainerRef::Channel(id),
        }
    }

    pub fn parse(kind: &str, id: &str) -> Option<Self> {
        let kind = ContainerKind::parse(kind)?;
        let id = ObjectId::parse_str(id).ok()?;
        Some(Self::new(kind, id))
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            ContainerRef::Conversation(_) => ContainerKind::Conversation,
            ContainerRef::Group(_) => ContainerKind::Group,
            ContainerRef::Channel(_) => ContainerKind::Channel,
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            ContainerRef::Conversation(id) | ContainerRef::Group(id) | ContainerRef::Channel(id) => {
                *id
            }
        }
    }

    /// Filter matching messages stored in this container.
    pub fn message_filter(&self) -> Document {
        doc! {
            "container.kind": self.kind().as_str(),
            "container.id": self.id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub user_id: ObjectId,
    pub joined_at: DateTime,
}

impl Member {
    pub fn new(user_id: ObjectId) -> Self {
        Self {
            user_id,
            joined_at: DateTime::now(),
        }
    }
}

/// Denormalized pointer to the newest message of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub message_id: ObjectId,
    pub sender_id: ObjectId,
    pub preview: String,
    pub created_at: DateTime,
}

pub fn member_ids(members: &[Member]) -> Vec<ObjectId> {
    members.iter().map(|m| m.user_id).collect()
}
