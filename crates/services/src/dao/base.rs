use bson::{doc, oid::ObjectId, Document};
use futures::TryStreamExt;
use mongodb::{
    ClientSession, Collection, Database,
    error::{ErrorKind, UNKNOWN_TRANSACTION_COMMIT_RESULT, TRANSIENT_TRANSACTION_ERROR, WriteFailure},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DaoError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("BSON serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("BSON deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
    #[error("Entity not found")]
    NotFound,
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Transient conflict: {0}")]
    Transient(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation: {0}")]
    Validation(String),
}

impl DaoError {
    /// Contention or a transaction abort that is worth retrying as a whole.
    pub fn is_transient(&self) -> bool {
        match self {
            DaoError::Transient(_) => true,
            DaoError::Mongo(e) => {
                e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                    || e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
            }
            _ => false,
        }
    }
}

pub type DaoResult<T> = Result<T, DaoError>;

pub struct BaseDao<T: Send + Sync> {
    collection: Collection<T>,
}

impl<T> BaseDao<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Unpin + Send + Sync,
{
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection::<T>(collection_name),
        }
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<T> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_one(&self, filter: Document) -> DaoResult<Option<T>> {
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn find_one_in(
        &self,
        session: &mut ClientSession,
        filter: Document,
    ) -> DaoResult<Option<T>> {
        Ok(self.collection.find_one(filter).session(session).await?)
    }

    pub async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
    ) -> DaoResult<Vec<T>> {
        let cursor = if let Some(sort) = sort {
            self.collection.find(filter).sort(sort).await?
        } else {
            self.collection.find(filter).await?
        };

        Ok(cursor.try_collect().await?)
    }

    pub async fn find_limited(
        &self,
        filter: Document,
        sort: Document,
        limit: i64,
    ) -> DaoResult<Vec<T>> {
        let cursor = self
            .collection
            .find(filter)
            .sort(sort)
            .limit(limit)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    pub async fn insert_one(&self, doc: &T) -> DaoResult<ObjectId> {
        let result = self
            .collection
            .insert_one(doc)
            .await
            .map_err(map_write_error)?;

        inserted_object_id(result.inserted_id)
    }

    pub async fn insert_one_in(
        &self,
        session: &mut ClientSession,
        doc: &T,
    ) -> DaoResult<ObjectId> {
        let result = self
            .collection
            .insert_one(doc)
            .session(session)
            .await
            .map_err(map_write_error)?;

        inserted_object_id(result.inserted_id)
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
    ) -> DaoResult<bool> {
        let result = self
            .collection
            .update_one(filter, with_timestamp(update))
            .await?;
        Ok(result.modified_count > 0)
    }

    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
    ) -> DaoResult<u64> {
        let result = self
            .collection
            .update_many(filter, with_timestamp(update))
            .await?;
        Ok(result.modified_count)
    }

    pub async fn update_by_id(&self, id: ObjectId, update: Document) -> DaoResult<bool> {
        self.update_one(doc! { "_id": id }, update).await
    }
}

/// Merge `updated_at` into the `$set` stage, creating it when absent.
fn with_timestamp(mut update: Document) -> Document {
    let now = bson::DateTime::now();
    match update.get_document_mut("$set") {
        Ok(set_doc) => {
            set_doc.insert("updated_at", now);
        }
        Err(_) => {
            update.insert("$set", doc! { "updated_at": now });
        }
    }
    update
}

fn map_write_error(e: mongodb::error::Error) -> DaoError {
    if let ErrorKind::Write(WriteFailure::WriteError(ref write_error)) = *e.kind {
        if write_error.code == 11000 {
            return DaoError::DuplicateKey(write_error.message.clone());
        }
    }
    DaoError::Mongo(e)
}

fn inserted_object_id(inserted: bson::Bson) -> DaoResult<ObjectId> {
    let id = inserted
        .as_object_id()
        .ok_or_else(|| DaoError::Validation("inserted_id is not an ObjectId".to_string()))?;
    debug!(?id, "Inserted document");
    Ok(id)
}
