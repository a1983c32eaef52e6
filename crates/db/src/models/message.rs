use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::container::ContainerRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub container: ContainerRef,
    pub sender_id: ObjectId,
    pub content: String,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    #[serde(default)]
    pub file_urls: Vec<String>,
    pub references: Option<MessageReference>,
    #[serde(default)]
    pub status: MessageStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageStatus {
    #[serde(default)]
    pub status: DeliveryStatus,
    /// Readers other than the sender. Only ever grows.
    #[serde(default)]
    pub seen_user_ids: Vec<ObjectId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }
}

/// Reply, forward or channel invitation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReference {
    pub kind: ReferenceKind,
    pub message_id: Option<ObjectId>,
    pub channel_id: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Reply,
    Forward,
    Invitation,
}

impl Message {
    pub const COLLECTION: &'static str = "messages";
}
