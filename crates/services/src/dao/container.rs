use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{ClientSession, Collection, Database};
use parley_db::models::{
    member_ids, Channel, ContainerKind, ContainerRef, Conversation, Group, LastMessage, Member,
};
use tracing::debug;

use super::base::{BaseDao, DaoError, DaoResult};

/// Conversations, groups and channels share one shape: embedded members plus
/// a `last_message` / `last_activity` summary.
pub struct ContainerDao {
    db: Database,
    pub conversations: BaseDao<Conversation>,
    pub groups: BaseDao<Group>,
    pub channels: BaseDao<Channel>,
}

impl ContainerDao {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            conversations: BaseDao::new(db, Conversation::COLLECTION),
            groups: BaseDao::new(db, Group::COLLECTION),
            channels: BaseDao::new(db, Channel::COLLECTION),
        }
    }

    fn raw(&self, kind: ContainerKind) -> Collection<Document> {
        self.db.collection::<Document>(kind.collection())
    }

    // --- Conversation resolution ---

    /// Fetches a conversation the caller belongs to. Absent and not-a-member
    /// are indistinguishable to the caller.
    pub async fn find_conversation_for(
        &self,
        conversation_id: ObjectId,
        caller: ObjectId,
    ) -> DaoResult<Conversation> {
        self.conversations
            .find_one(doc! { "_id": conversation_id, "members.user_id": caller })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_conversation_by_pair(
        &self,
        a: ObjectId,
        b: ObjectId,
    ) -> DaoResult<Option<Conversation>> {
        self.conversations
            .find_one(doc! { "pair_key": Conversation::pair_key(a, b) })
            .await
    }

    /// Find-or-create outside a transaction. A concurrent creator loses on the
    /// unique `pair_key` index and re-reads the winner's record.
    pub async fn find_or_create_conversation(
        &self,
        a: ObjectId,
        b: ObjectId,
    ) -> DaoResult<Conversation> {
        check_pair(a, b)?;
        if let Some(existing) = self.find_conversation_by_pair(a, b).await? {
            return Ok(existing);
        }

        let mut conversation = new_conversation(a, b);
        match self.conversations.insert_one(&conversation).await {
            Ok(id) => {
                conversation.id = Some(id);
                Ok(conversation)
            }
            Err(DaoError::DuplicateKey(_)) => {
                debug!(?a, ?b, "Conversation created concurrently, re-fetching");
                self.find_conversation_by_pair(a, b)
                    .await?
                    .ok_or(DaoError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves the conversation a direct message goes to, inside the caller's
    /// transaction. Losing a pair-creation race aborts the transaction with a
    /// transient error so the whole unit is retried and finds the winner.
    pub async fn resolve_conversation_in(
        &self,
        session: &mut ClientSession,
        conversation_id: Option<ObjectId>,
        caller: ObjectId,
        peer: Option<ObjectId>,
    ) -> DaoResult<Conversation> {
        if let Some(id) = conversation_id {
            return self
                .conversations
                .find_one_in(session, doc! { "_id": id, "members.user_id": caller })
                .await?
                .ok_or(DaoError::NotFound);
        }

        let peer = peer.ok_or_else(|| {
            DaoError::Validation("receiver_id is required without conversation_id".to_string())
        })?;
        check_pair(caller, peer)?;

        let filter = doc! { "pair_key": Conversation::pair_key(caller, peer) };
        if let Some(existing) = self.conversations.find_one_in(session, filter).await? {
            return Ok(existing);
        }

        let mut conversation = new_conversation(caller, peer);
        match self.conversations.insert_one_in(session, &conversation).await {
            Ok(id) => {
                conversation.id = Some(id);
                Ok(conversation)
            }
            Err(DaoError::DuplicateKey(msg)) => Err(DaoError::Transient(msg)),
            Err(e) => Err(e),
        }
    }

    // --- Membership ---

    pub async fn member_ids(&self, container: ContainerRef) -> DaoResult<Vec<ObjectId>> {
        let members = match container {
            ContainerRef::Conversation(id) => self.conversations.find_by_id(id).await?.members,
            ContainerRef::Group(id) => self.groups.find_by_id(id).await?.members,
            ContainerRef::Channel(id) => self.channels.find_by_id(id).await?.members,
        };
        Ok(member_ids(&members))
    }

    pub async fn is_member(&self, container: ContainerRef, user_id: ObjectId) -> DaoResult<bool> {
        let count = self
            .raw(container.kind())
            .count_documents(doc! { "_id": container.id(), "members.user_id": user_id })
            .await?;
        Ok(count > 0)
    }

    /// NotFound when the container is absent, Forbidden when the user is not in it.
    pub async fn ensure_member(&self, container: ContainerRef, user_id: ObjectId) -> DaoResult<()> {
        let members = self.member_ids(container).await?;
        if members.contains(&user_id) {
            Ok(())
        } else {
            Err(DaoError::Forbidden(format!(
                "Not a member of this {}",
                container.kind().as_str()
            )))
        }
    }

    /// Groups and channels the user belongs to; these double as broadcast rooms.
    pub async fn room_refs_for(&self, user_id: ObjectId) -> DaoResult<Vec<ContainerRef>> {
        let filter = doc! { "members.user_id": user_id };
        let groups = self.groups.find_many(filter.clone(), None).await?;
        let channels = self.channels.find_many(filter, None).await?;

        Ok(groups
            .into_iter()
            .filter_map(|g| g.id.map(ContainerRef::Group))
            .chain(channels.into_iter().filter_map(|c| c.id.map(ContainerRef::Channel)))
            .collect())
    }

    // --- Summary ---

    /// Moves `last_message` forward only. An update carrying an older
    /// `created_at` than the stored summary matches nothing and is dropped.
    pub async fn apply_summary(
        &self,
        container: ContainerRef,
        summary: &LastMessage,
    ) -> DaoResult<bool> {
        let filter = doc! {
            "_id": container.id(),
            "$or": [
                { "last_message": null },
                { "last_message.created_at": { "$lte": summary.created_at } },
            ],
        };
        let update = doc! {
            "$set": {
                "last_message": bson::to_bson(summary)?,
                "last_activity": summary.created_at,
                "updated_at": DateTime::now(),
            }
        };

        let result = self.raw(container.kind()).update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }

    // --- Groups ---

    pub async fn create_group(
        &self,
        creator_id: ObjectId,
        name: String,
        description: Option<String>,
        member_ids: Vec<ObjectId>,
    ) -> DaoResult<Group> {
        let now = DateTime::now();
        let group = Group {
            id: None,
            name,
            description,
            creator_id,
            members: unique_members(creator_id, member_ids),
            last_message: None,
            last_activity: Some(now),
            created_at: now,
            updated_at: now,
        };

        let id = self.groups.insert_one(&group).await?;
        self.groups.find_by_id(id).await
    }

    pub async fn join_group(&self, group_id: ObjectId, user_id: ObjectId) -> DaoResult<()> {
        self.push_member(ContainerKind::Group, group_id, user_id).await
    }

    pub async fn leave_group(&self, group_id: ObjectId, user_id: ObjectId) -> DaoResult<bool> {
        self.groups
            .update_by_id(group_id, doc! { "$pull": { "members": { "user_id": user_id } } })
            .await
    }

    pub async fn groups_for(&self, user_id: ObjectId) -> DaoResult<Vec<Group>> {
        self.groups
            .find_many(
                doc! { "members.user_id": user_id },
                Some(doc! { "last_activity": -1 }),
            )
            .await
    }

    // --- Channels ---

    pub async fn create_channel(
        &self,
        creator_id: ObjectId,
        name: String,
        description: Option<String>,
    ) -> DaoResult<Channel> {
        let now = DateTime::now();
        let channel = Channel {
            id: None,
            name,
            description,
            creator_id,
            admin_ids: vec![creator_id],
            members: vec![Member::new(creator_id)],
            last_message: None,
            last_activity: Some(now),
            created_at: now,
            updated_at: now,
        };

        let id = self.channels.insert_one(&channel).await?;
        self.channels.find_by_id(id).await
    }

    pub async fn add_channel_member(
        &self,
        channel_id: ObjectId,
        admin_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<()> {
        let channel = self.channels.find_by_id(channel_id).await?;
        if !channel.is_admin(admin_id) {
            return Err(DaoError::Forbidden("Only channel admins can add members".to_string()));
        }
        self.push_member(ContainerKind::Channel, channel_id, user_id).await
    }

    pub async fn channels_for(&self, user_id: ObjectId) -> DaoResult<Vec<Channel>> {
        self.channels
            .find_many(
                doc! { "members.user_id": user_id },
                Some(doc! { "last_activity": -1 }),
            )
            .await
    }

    pub async fn conversations_for(&self, user_id: ObjectId) -> DaoResult<Vec<Conversation>> {
        self.conversations
            .find_many(
                doc! { "members.user_id": user_id },
                Some(doc! { "last_activity": -1 }),
            )
            .await
    }

    async fn push_member(
        &self,
        kind: ContainerKind,
        container_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<()> {
        let member = bson::to_bson(&Member::new(user_id))?;
        let result = self
            .raw(kind)
            .update_one(
                doc! { "_id": container_id, "members.user_id": { "$ne": user_id } },
                doc! {
                    "$push": { "members": member },
                    "$set": { "updated_at": DateTime::now() },
                },
            )
            .await?;

        if result.modified_count > 0 {
            return Ok(());
        }

        let exists = self
            .raw(kind)
            .count_documents(doc! { "_id": container_id })
            .await?;
        if exists == 0 {
            Err(DaoError::NotFound)
        } else {
            Err(DaoError::DuplicateKey("Already a member".to_string()))
        }
    }
}

fn check_pair(a: ObjectId, b: ObjectId) -> DaoResult<()> {
    if a == b {
        return Err(DaoError::Validation(
            "A conversation needs two distinct users".to_string(),
        ));
    }
    Ok(())
}

fn new_conversation(a: ObjectId, b: ObjectId) -> Conversation {
    let now = DateTime::now();
    Conversation {
        id: None,
        pair_key: Conversation::pair_key(a, b),
        members: vec![Member::new(a), Member::new(b)],
        last_message: None,
        last_activity: Some(now),
        created_at: now,
        updated_at: now,
    }
}

fn unique_members(creator_id: ObjectId, others: Vec<ObjectId>) -> Vec<Member> {
    let mut ids = vec![creator_id];
    for id in others {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids.into_iter().map(Member::new).collect()
}
