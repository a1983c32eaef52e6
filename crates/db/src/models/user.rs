use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub push_tokens: Vec<PushToken>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Device token for the push provider. `created_at` drives stale pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushToken {
    pub token: String,
    pub created_at: DateTime,
}

impl User {
    pub const COLLECTION: &'static str = "users";

    pub fn push_token_values(&self) -> Vec<String> {
        self.push_tokens.iter().map(|t| t.token.clone()).collect()
    }
}
