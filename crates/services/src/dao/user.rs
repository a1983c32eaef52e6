use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use parley_db::models::User;

use super::base::{BaseDao, DaoError, DaoResult};

pub struct UserDao {
    pub base: BaseDao<User>,
}

impl UserDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, User::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        username: String,
        display_name: String,
        avatar: Option<String>,
        password_hash: String,
    ) -> DaoResult<User> {
        let now = DateTime::now();
        let user = User {
            id: None,
            username,
            display_name,
            avatar,
            password_hash: Some(password_hash),
            push_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let id = self.base.insert_one(&user).await?;
        self.base.find_by_id(id).await
    }

    pub async fn find_by_username(&self, username: &str) -> DaoResult<User> {
        self.base
            .find_one(doc! { "username": username })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_by_ids(&self, ids: &[ObjectId]) -> DaoResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.base
            .find_many(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await
    }

    /// Adds a device token unless the user already has it.
    pub async fn add_push_token(&self, user_id: ObjectId, token: &str) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": user_id, "push_tokens.token": { "$ne": token } },
                doc! {
                    "$push": {
                        "push_tokens": { "token": token, "created_at": DateTime::now() }
                    }
                },
            )
            .await
    }

    pub async fn remove_push_tokens(
        &self,
        user_id: ObjectId,
        tokens: &[String],
    ) -> DaoResult<bool> {
        if tokens.is_empty() {
            return Ok(false);
        }
        self.base
            .update_by_id(
                user_id,
                doc! { "$pull": { "push_tokens": { "token": { "$in": tokens.to_vec() } } } },
            )
            .await
    }

    /// Drops every token registered before `cutoff`. Returns the number of users touched.
    pub async fn prune_stale_push_tokens(&self, cutoff: DateTime) -> DaoResult<u64> {
        self.base
            .update_many(
                doc! { "push_tokens.created_at": { "$lt": cutoff } },
                doc! { "$pull": { "push_tokens": { "created_at": { "$lt": cutoff } } } },
            )
            .await
    }
}
