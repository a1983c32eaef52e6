pub mod auth;
pub mod channel;
pub mod conversation;
pub mod group;
pub mod message;
pub mod user;

use bson::oid::ObjectId;
use parley_db::models::ContainerRef;
use serde::Deserialize;

use crate::error::ApiError;

pub(crate) fn parse_id(value: &str, field: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::BadRequest(format!("Invalid {field}")))
}

pub(crate) fn parse_ids(values: &[String], field: &str) -> Result<Vec<ObjectId>, ApiError> {
    values.iter().map(|v| parse_id(v, field)).collect()
}

/// `{ "kind": "group", "id": "..." }` as sent by clients.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerRefBody {
    pub kind: String,
    pub id: String,
}

impl ContainerRefBody {
    pub fn parse(&self) -> Result<ContainerRef, ApiError> {
        ContainerRef::parse(&self.kind, &self.id)
            .ok_or_else(|| ApiError::BadRequest("Invalid container".to_string()))
    }
}

/// Cursor pagination: newest first, `before` is an exclusive message id.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub before: Option<String>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn cursor(&self) -> Result<Option<ObjectId>, ApiError> {
        self.before
            .as_deref()
            .map(|b| parse_id(b, "before"))
            .transpose()
    }
}
