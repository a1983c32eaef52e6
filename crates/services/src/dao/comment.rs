use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use parley_db::models::Comment;

use super::base::{BaseDao, DaoResult};

pub struct CommentDao {
    pub base: BaseDao<Comment>,
}

impl CommentDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Comment::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        message_id: ObjectId,
        channel_id: ObjectId,
        author_id: ObjectId,
        content: String,
    ) -> DaoResult<Comment> {
        let comment = Comment {
            id: None,
            message_id,
            channel_id,
            author_id,
            content,
            created_at: DateTime::now(),
        };

        let id = self.base.insert_one(&comment).await?;
        self.base.find_by_id(id).await
    }

    /// Oldest first, threaded under the parent post.
    pub async fn list_for(&self, message_id: ObjectId) -> DaoResult<Vec<Comment>> {
        self.base
            .find_many(doc! { "message_id": message_id }, Some(doc! { "_id": 1 }))
            .await
    }
}
