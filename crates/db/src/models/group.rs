use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::container::{LastMessage, Member};

/// N-party container with self-service membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: ObjectId,
    #[serde(default)]
    pub members: Vec<Member>,
    pub last_message: Option<LastMessage>,
    pub last_activity: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Group {
    pub const COLLECTION: &'static str = "groups";
}
