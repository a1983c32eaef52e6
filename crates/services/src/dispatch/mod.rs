pub mod preview;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use bson::{doc, oid::ObjectId, DateTime};
use futures::future::join_all;
use mongodb::{ClientSession, Database};
use parley_config::DispatchSettings;
use parley_db::models::{
    Comment, ContainerKind, ContainerRef, LastMessage, Message, MessageReference, MessageStatus,
    ReferenceKind, User,
};
use tracing::{debug, info, warn};

use crate::background::TaskService;
use crate::dao::{CommentDao, ContainerDao, DaoError, DaoResult, MessageDao, UserDao};
use crate::error::{ChatError, ChatResult};
use crate::notification::Notifier;
use crate::realtime::{events, PresenceRegistry, ServerEvent};
use crate::request::AuthenticatedRequest;
use crate::views::{event_payload, CommentView, MessageView};

use self::preview::preview_for;
use self::retry::RetryPolicy;

/// Where a message goes. A direct message names either an existing
/// conversation or the peer to start one with.
#[derive(Debug, Clone)]
pub enum SendTarget {
    Conversation {
        conversation_id: Option<ObjectId>,
        receiver_id: Option<ObjectId>,
    },
    Group(ObjectId),
    Channel(ObjectId),
}

#[derive(Debug, Clone)]
pub struct SendMessage {
    pub target: SendTarget,
    pub content: String,
    pub photo_urls: Vec<String>,
    pub file_urls: Vec<String>,
    pub references: Option<MessageReference>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub message_id: ObjectId,
    pub content: String,
}

/// Persist, then answer, then update the summary and fan out in the
/// background. Nothing after the commit can fail a send.
#[derive(Clone)]
pub struct MessageDispatcher {
    db: Database,
    users: Arc<UserDao>,
    containers: Arc<ContainerDao>,
    messages: Arc<MessageDao>,
    comments: Arc<CommentDao>,
    presence: Arc<PresenceRegistry>,
    notifier: Arc<Notifier>,
    tasks: TaskService,
    retry: RetryPolicy,
    preview_length: usize,
    ack_timeout: Duration,
}

impl MessageDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        users: Arc<UserDao>,
        containers: Arc<ContainerDao>,
        messages: Arc<MessageDao>,
        comments: Arc<CommentDao>,
        presence: Arc<PresenceRegistry>,
        notifier: Arc<Notifier>,
        tasks: TaskService,
        settings: &DispatchSettings,
    ) -> Self {
        Self {
            db,
            users,
            containers,
            messages,
            comments,
            presence,
            notifier,
            tasks,
            retry: RetryPolicy::new(
                settings.retry_max_attempts,
                Duration::from_millis(settings.retry_initial_delay_ms),
            ),
            preview_length: settings.preview_length,
            ack_timeout: Duration::from_millis(settings.ack_timeout_ms),
        }
    }

    pub async fn send(&self, req: AuthenticatedRequest<SendMessage>) -> ChatResult<Message> {
        let sender_id = req.caller_id;
        let input = req.payload;

        validate(sender_id, &input)?;
        self.authorize(sender_id, &input).await?;

        let message_id = ObjectId::new();
        let message = self.persist_with_retry(sender_id, message_id, &input).await?;
        info!(
            ?message_id,
            ?sender_id,
            container = message.container.kind().as_str(),
            "Message stored"
        );

        self.spawn_follow_up(message.clone());
        Ok(message)
    }

    pub async fn comment(&self, req: AuthenticatedRequest<NewComment>) -> ChatResult<Comment> {
        let author_id = req.caller_id;
        let input = req.payload;

        if input.content.trim().is_empty() {
            return Err(ChatError::Validation("Comment content is required".to_string()));
        }

        let parent = self.messages.base.find_by_id(input.message_id).await?;
        let ContainerRef::Channel(channel_id) = parent.container else {
            return Err(ChatError::Validation(
                "Comments are only allowed on channel posts".to_string(),
            ));
        };
        self.containers
            .ensure_member(parent.container, author_id)
            .await?;

        let comment = self
            .comments
            .create(input.message_id, channel_id, author_id, input.content)
            .await?;
        debug!(comment_id = ?comment.id, ?channel_id, "Comment stored");

        let presence = Arc::clone(&self.presence);
        let view = CommentView::from(&comment);
        self.tasks.spawn_task("comment_fan_out", async move {
            let event = ServerEvent::new(events::CHANNEL_COMMENT_NEW, event_payload(&view)?);
            let delivered = presence.publish_to_room(channel_id, &event, Some(author_id));
            debug!(?channel_id, delivered, "Comment broadcast");
            Ok(())
        });

        Ok(comment)
    }

    /// Membership and role checks that do not depend on the transaction.
    async fn authorize(&self, sender_id: ObjectId, input: &SendMessage) -> ChatResult<()> {
        match input.target {
            SendTarget::Group(group_id) => {
                self.containers
                    .ensure_member(ContainerRef::Group(group_id), sender_id)
                    .await?;
            }
            SendTarget::Channel(channel_id) => {
                let channel = self.containers.channels.find_by_id(channel_id).await?;
                if !channel.is_admin(sender_id) {
                    return Err(ChatError::Permission(
                        "Only channel admins can post".to_string(),
                    ));
                }
            }
            SendTarget::Conversation {
                conversation_id: None,
                receiver_id: Some(receiver_id),
            } => {
                self.users.base.find_by_id(receiver_id).await?;
            }
            SendTarget::Conversation { .. } => {}
        }

        if let Some(MessageReference {
            kind: ReferenceKind::Invitation,
            channel_id: Some(channel_id),
            ..
        }) = input.references
        {
            self.containers
                .ensure_member(ContainerRef::Channel(channel_id), sender_id)
                .await?;
        }
        Ok(())
    }

    async fn persist_with_retry(
        &self,
        sender_id: ObjectId,
        message_id: ObjectId,
        input: &SendMessage,
    ) -> ChatResult<Message> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.persist_once(sender_id, message_id, input).await {
                Ok(message) => return Ok(message),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e.into()),
            };

            // An ambiguous commit may have landed.
            if let Ok(Some(stored)) = self.messages.base.find_one(doc! { "_id": message_id }).await
            {
                debug!(?message_id, attempt, "Commit landed despite error");
                return Ok(stored);
            }

            match self.retry.delay_after(attempt) {
                Some(delay) => {
                    warn!(?message_id, attempt, ?delay, error = %err, "Transient store error, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(ChatError::TransientStore {
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// Resolve-or-create the container and insert the message as one unit.
    async fn persist_once(
        &self,
        sender_id: ObjectId,
        message_id: ObjectId,
        input: &SendMessage,
    ) -> DaoResult<Message> {
        let mut session = self.db.client().start_session().await?;
        session.start_transaction().await?;

        match self
            .persist_in(&mut session, sender_id, message_id, input)
            .await
        {
            Ok(message) => {
                session.commit_transaction().await?;
                Ok(message)
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    debug!(%abort_err, "Abort after failed persist");
                }
                Err(e)
            }
        }
    }

    async fn persist_in(
        &self,
        session: &mut ClientSession,
        sender_id: ObjectId,
        message_id: ObjectId,
        input: &SendMessage,
    ) -> DaoResult<Message> {
        let container = match input.target {
            SendTarget::Conversation {
                conversation_id,
                receiver_id,
            } => {
                let conversation = self
                    .containers
                    .resolve_conversation_in(session, conversation_id, sender_id, receiver_id)
                    .await?;
                ContainerRef::Conversation(conversation.id.ok_or(DaoError::NotFound)?)
            }
            SendTarget::Group(id) => ContainerRef::Group(id),
            SendTarget::Channel(id) => ContainerRef::Channel(id),
        };

        let now = DateTime::now();
        let message = Message {
            id: Some(message_id),
            container,
            sender_id,
            content: input.content.clone(),
            photo_urls: input.photo_urls.clone(),
            file_urls: input.file_urls.clone(),
            references: input.references.clone(),
            status: MessageStatus::default(),
            created_at: now,
            updated_at: now,
        };
        self.messages.insert_in(session, &message).await?;
        Ok(message)
    }

    /// Summary and fan-out are independent; neither waits for the other.
    fn spawn_follow_up(&self, message: Message) {
        let this = self.clone();
        let for_summary = message.clone();
        self.tasks.spawn_task("summary_update", async move {
            this.update_summary(&for_summary).await
        });

        let this = self.clone();
        self.tasks
            .spawn_task("fan_out", async move { this.fan_out(&message).await });
    }

    async fn update_summary(&self, message: &Message) -> ChatResult<()> {
        let summary = LastMessage {
            message_id: message.id.unwrap_or_default(),
            sender_id: message.sender_id,
            preview: preview_for(
                &message.content,
                message.photo_urls.len(),
                message.file_urls.len(),
                self.preview_length,
            ),
            created_at: message.created_at,
        };

        let applied = self
            .containers
            .apply_summary(message.container, &summary)
            .await?;
        if !applied {
            debug!(message_id = ?message.id, "Newer summary already stored");
        }
        Ok(())
    }

    async fn fan_out(&self, message: &Message) -> ChatResult<()> {
        let recipients: Vec<ObjectId> = self
            .containers
            .member_ids(message.container)
            .await?
            .into_iter()
            .filter(|id| *id != message.sender_id)
            .collect();

        let event = ServerEvent::new(
            new_message_event(message.container.kind()),
            event_payload(&MessageView::from(message))?,
        );

        let mut offline = Vec::new();
        let mut live = Vec::new();
        for recipient in recipients {
            match self.presence.lookup(recipient) {
                Some(connection) => live.push(self.deliver_live(connection, event.clone(), message)),
                None => offline.push(recipient),
            }
        }

        debug!(
            message_id = ?message.id,
            live = live.len(),
            offline = offline.len(),
            "Fanning out"
        );

        // Live acks and offline pushes run side by side.
        let fallback = async {
            if offline.is_empty() {
                return Ok(());
            }
            self.notify_offline(message, &offline).await
        };
        let (_, pushed) = tokio::join!(join_all(live), fallback);
        pushed
    }

    /// At most once: an unacknowledged push is logged and left to the next fetch.
    async fn deliver_live(
        &self,
        connection: crate::realtime::Connection,
        event: ServerEvent,
        message: &Message,
    ) {
        let recipient = connection.user_id;
        match self
            .presence
            .send_with_ack(&connection, event, self.ack_timeout)
            .await
        {
            Ok(()) => {
                if message.container.kind() == ContainerKind::Channel {
                    return;
                }
                if let Some(id) = message.id {
                    if let Err(e) = self.messages.mark_delivered(id).await {
                        warn!(?id, %e, "Failed to mark message delivered");
                    }
                }
            }
            Err(e) => {
                warn!(?recipient, message_id = ?message.id, %e, "Live delivery not acknowledged");
            }
        }
    }

    async fn notify_offline(&self, message: &Message, offline: &[ObjectId]) -> ChatResult<()> {
        let mut ids = offline.to_vec();
        ids.push(message.sender_id);
        let mut users = self.users.find_by_ids(&ids).await?;

        let sender_pos = users
            .iter()
            .position(|u| u.id == Some(message.sender_id))
            .ok_or_else(|| ChatError::NotFound("Sender not found".to_string()))?;
        let sender: User = users.swap_remove(sender_pos);

        let pushes = users.iter().map(|recipient| {
            let sender = &sender;
            async move {
                if let Err(e) = self.notifier.notify_offline(recipient, sender, message).await {
                    warn!(recipient = ?recipient.id, %e, "Push notification failed");
                }
            }
        });
        join_all(pushes).await;
        Ok(())
    }
}

fn validate(sender_id: ObjectId, input: &SendMessage) -> ChatResult<()> {
    if input.content.trim().is_empty() && input.photo_urls.is_empty() && input.file_urls.is_empty()
    {
        return Err(ChatError::Validation(
            "Message needs content or an attachment".to_string(),
        ));
    }

    if let SendTarget::Conversation {
        conversation_id,
        receiver_id,
    } = input.target
    {
        if conversation_id.is_none() && receiver_id.is_none() {
            return Err(ChatError::Validation(
                "Either conversation_id or receiver_id is required".to_string(),
            ));
        }
        if receiver_id == Some(sender_id) {
            return Err(ChatError::Validation(
                "Cannot send a message to yourself".to_string(),
            ));
        }
    }

    if let Some(reference) = &input.references {
        match reference.kind {
            ReferenceKind::Invitation => {
                if reference.channel_id.is_none() {
                    return Err(ChatError::Validation(
                        "An invitation must name a channel".to_string(),
                    ));
                }
                if !matches!(input.target, SendTarget::Conversation { .. }) {
                    return Err(ChatError::Validation(
                        "Invitations are sent as direct messages".to_string(),
                    ));
                }
            }
            ReferenceKind::Reply | ReferenceKind::Forward => {
                if reference.message_id.is_none() {
                    return Err(ChatError::Validation(
                        "A reply or forward must name a message".to_string(),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn new_message_event(kind: ContainerKind) -> &'static str {
    match kind {
        ContainerKind::Conversation => events::MESSAGE_NEW,
        ContainerKind::Group => events::GROUP_MESSAGE_NEW,
        ContainerKind::Channel => events::CHANNEL_MESSAGE_NEW,
    }
}
