use bson::{doc, oid::ObjectId};
use mongodb::{ClientSession, Database};
use parley_db::models::{ContainerRef, DeliveryStatus, Message};

use super::base::{BaseDao, DaoResult};

pub const DEFAULT_PAGE_SIZE: i64 = 15;
pub const MAX_PAGE_SIZE: i64 = 100;

pub struct MessageDao {
    pub base: BaseDao<Message>,
}

impl MessageDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Message::COLLECTION),
        }
    }

    /// Inserts a message whose `_id` was assigned by the caller, so a retried
    /// transaction can tell whether an earlier attempt already committed it.
    pub async fn insert_in(
        &self,
        session: &mut ClientSession,
        message: &Message,
    ) -> DaoResult<ObjectId> {
        self.base.insert_one_in(session, message).await
    }

    /// Newest first. `before` is an exclusive cursor on `_id`.
    pub async fn find_page(
        &self,
        container: ContainerRef,
        before: Option<ObjectId>,
        limit: Option<i64>,
    ) -> DaoResult<Vec<Message>> {
        let mut filter = container.message_filter();
        if let Some(before) = before {
            filter.insert("_id", doc! { "$lt": before });
        }

        self.base
            .find_limited(filter, doc! { "_id": -1 }, page_size(limit))
            .await
    }

    pub async fn latest_in(&self, container: ContainerRef, count: i64) -> DaoResult<Vec<Message>> {
        self.base
            .find_limited(container.message_filter(), doc! { "_id": -1 }, count)
            .await
    }

    pub async fn find_by_ids(&self, ids: &[ObjectId]) -> DaoResult<Vec<Message>> {
        self.base
            .find_many(doc! { "_id": { "$in": ids.to_vec() } }, Some(doc! { "_id": 1 }))
            .await
    }

    /// Messages among `ids` that `reader` has not seen and did not send.
    pub async fn find_unseen(
        &self,
        ids: &[ObjectId],
        reader: ObjectId,
        container: Option<ContainerRef>,
    ) -> DaoResult<Vec<Message>> {
        let mut filter = doc! {
            "_id": { "$in": ids.to_vec() },
            "sender_id": { "$ne": reader },
            "status.seen_user_ids": { "$ne": reader },
        };
        if let Some(container) = container {
            filter.extend(container.message_filter());
        }

        self.base.find_many(filter, Some(doc! { "_id": 1 })).await
    }

    /// Set-union of `reader` into each message's seen list. Concurrent readers
    /// never overwrite each other.
    pub async fn add_seen(&self, ids: &[ObjectId], reader: ObjectId) -> DaoResult<u64> {
        self.base
            .update_many(
                doc! {
                    "_id": { "$in": ids.to_vec() },
                    "sender_id": { "$ne": reader },
                },
                doc! {
                    "$addToSet": { "status.seen_user_ids": reader },
                    "$set": { "status.status": DeliveryStatus::Read.as_str() },
                },
            )
            .await
    }

    /// SENT -> DELIVERED. A message already read stays read.
    pub async fn mark_delivered(&self, id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id, "status.status": DeliveryStatus::Sent.as_str() },
                doc! { "$set": { "status.status": DeliveryStatus::Delivered.as_str() } },
            )
            .await
    }
}

pub fn page_size(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}
