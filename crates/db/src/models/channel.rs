use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::container::{LastMessage, Member};

/// Admin-moderated broadcast container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: ObjectId,
    #[serde(default)]
    pub admin_ids: Vec<ObjectId>,
    #[serde(default)]
    pub members: Vec<Member>,
    pub last_message: Option<LastMessage>,
    pub last_activity: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Channel {
    pub const COLLECTION: &'static str = "channels";

    pub fn is_admin(&self, user_id: ObjectId) -> bool {
        self.admin_ids.contains(&user_id)
    }
}
