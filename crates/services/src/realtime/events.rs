use serde::Serialize;
use serde_json::Value;

pub const CONNECTED: &str = "connected";
pub const PONG: &str = "pong";
pub const ERROR: &str = "error";
pub const ONLINE_USERS: &str = "presence:online_users";
pub const MESSAGE_NEW: &str = "message:new";
pub const GROUP_MESSAGE_NEW: &str = "message:group_new";
pub const CHANNEL_MESSAGE_NEW: &str = "message:channel_new";
pub const STATUS_UPDATED: &str = "message:status_updated";
pub const CHANNEL_COMMENT_NEW: &str = "comment:channel_new";

/// Server-to-client frame. `ack_id` is set when the client must confirm receipt.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
}

impl ServerEvent {
    pub fn new(event_type: &'static str, data: Value) -> Self {
        Self {
            event_type,
            data,
            ack_id: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
