use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::container::{LastMessage, Member};

/// Two-party container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Order-independent signature of the member pair; unique.
    pub pair_key: String,
    #[serde(default)]
    pub members: Vec<Member>,
    pub last_message: Option<LastMessage>,
    pub last_activity: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Conversation {
    pub const COLLECTION: &'static str = "conversations";

    pub fn pair_key(a: ObjectId, b: ObjectId) -> String {
        let (lo, hi) = if a.bytes() <= b.bytes() { (a, b) } else { (b, a) };
        format!("{}:{}", lo.to_hex(), hi.to_hex())
    }

    pub fn other_member(&self, user_id: ObjectId) -> Option<ObjectId> {
        self.members
            .iter()
            .map(|m| m.user_id)
            .find(|id| *id != user_id)
    }
}
