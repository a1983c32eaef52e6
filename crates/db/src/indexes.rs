use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

use crate::models::{Channel, Comment, Conversation, Group, Message, User};

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Users
    create_indexes(
        db,
        User::COLLECTION,
        vec![index_unique(bson::doc! { "username": 1 })],
    )
    .await?;

    // Conversations: one container per unordered member pair
    create_indexes(
        db,
        Conversation::COLLECTION,
        vec![
            index_unique(bson::doc! { "pair_key": 1 }),
            index(bson::doc! { "members.user_id": 1, "last_activity": -1 }),
        ],
    )
    .await?;

    // Groups
    create_indexes(
        db,
        Group::COLLECTION,
        vec![index(bson::doc! { "members.user_id": 1, "last_activity": -1 })],
    )
    .await?;

    // Channels
    create_indexes(
        db,
        Channel::COLLECTION,
        vec![index(bson::doc! { "members.user_id": 1, "last_activity": -1 })],
    )
    .await?;

    // Messages
    create_indexes(
        db,
        Message::COLLECTION,
        vec![
            index(bson::doc! { "container.kind": 1, "container.id": 1, "_id": -1 }),
            index(bson::doc! { "sender_id": 1, "created_at": -1 }),
        ],
    )
    .await?;

    // Comments
    create_indexes(
        db,
        Comment::COLLECTION,
        vec![index(bson::doc! { "message_id": 1, "_id": -1 })],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    info!(collection, "Indexes created");
    Ok(())
}
