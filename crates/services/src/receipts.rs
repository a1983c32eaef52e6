use std::collections::HashMap;
use std::sync::Arc;

use bson::oid::ObjectId;
use parley_db::models::{ContainerRef, Message};
use tracing::debug;

use crate::background::TaskService;
use crate::dao::{ContainerDao, MessageDao};
use crate::error::{ChatError, ChatResult};
use crate::realtime::{events, PresenceRegistry, ServerEvent};
use crate::request::AuthenticatedRequest;
use crate::views::messages_json;

#[derive(Debug, Clone)]
pub struct MarkSeen {
    pub message_ids: Vec<ObjectId>,
    /// Restricts the batch to one container and checks the reader belongs to it.
    pub container: Option<ContainerRef>,
}

/// Batch read receipts. Readers are added with a set union, so concurrent
/// and repeated calls converge on the same state.
pub struct ReceiptAggregator {
    containers: Arc<ContainerDao>,
    messages: Arc<MessageDao>,
    presence: Arc<PresenceRegistry>,
    tasks: TaskService,
}

impl ReceiptAggregator {
    pub fn new(
        containers: Arc<ContainerDao>,
        messages: Arc<MessageDao>,
        presence: Arc<PresenceRegistry>,
        tasks: TaskService,
    ) -> Self {
        Self {
            containers,
            messages,
            presence,
            tasks,
        }
    }

    /// Returns the messages this call changed. Already-seen and self-sent
    /// messages are skipped; an all-skipped batch is an empty success.
    pub async fn mark_seen(&self, req: AuthenticatedRequest<MarkSeen>) -> ChatResult<Vec<Message>> {
        let reader = req.caller_id;
        let MarkSeen {
            mut message_ids,
            container,
        } = req.payload;

        if message_ids.is_empty() {
            return Err(ChatError::Validation("message_ids must not be empty".to_string()));
        }
        message_ids.sort();
        message_ids.dedup();

        if let Some(container) = container {
            if !self.containers.is_member(container, reader).await? {
                return Err(ChatError::Permission(format!(
                    "Not a member of this {}",
                    container.kind().as_str()
                )));
            }
        }

        let pending = self
            .messages
            .find_unseen(&message_ids, reader, container)
            .await?;
        if pending.is_empty() {
            debug!(?reader, requested = message_ids.len(), "Nothing new to mark seen");
            return Ok(Vec::new());
        }

        let pending_ids: Vec<ObjectId> = pending.iter().filter_map(|m| m.id).collect();
        self.authorize_unhinted(&pending, reader, container).await?;

        let modified = self.messages.add_seen(&pending_ids, reader).await?;
        debug!(?reader, modified, "Marked messages seen");

        let updated = self.messages.find_by_ids(&pending_ids).await?;
        self.spawn_status_fan_out(updated.clone(), reader);
        Ok(updated)
    }

    /// Without a hint, every touched container still has to include the reader.
    async fn authorize_unhinted(
        &self,
        pending: &[Message],
        reader: ObjectId,
        hint: Option<ContainerRef>,
    ) -> ChatResult<()> {
        if hint.is_some() {
            return Ok(());
        }
        let mut checked: Vec<ContainerRef> = Vec::new();
        for message in pending {
            if checked.contains(&message.container) {
                continue;
            }
            if !self.containers.is_member(message.container, reader).await? {
                return Err(ChatError::Permission(
                    "Cannot mark messages outside your containers".to_string(),
                ));
            }
            checked.push(message.container);
        }
        Ok(())
    }

    fn spawn_status_fan_out(&self, updated: Vec<Message>, reader: ObjectId) {
        let presence = Arc::clone(&self.presence);
        self.tasks.spawn_task("status_fan_out", async move {
            for (target, batch) in group_by_target(&updated) {
                let event = ServerEvent::new(events::STATUS_UPDATED, messages_json(&batch)?);
                match target {
                    StatusTarget::Sender(sender_id) => {
                        if !presence.send_to_user(sender_id, event) {
                            debug!(?sender_id, "Sender offline, receipt not pushed");
                        }
                    }
                    StatusTarget::Room(room_id) => {
                        presence.publish_to_room(room_id, &event, Some(reader));
                    }
                }
            }
            Ok(())
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StatusTarget {
    /// 1:1 receipts go only to whoever wrote the message.
    Sender(ObjectId),
    Room(ObjectId),
}

fn group_by_target(messages: &[Message]) -> HashMap<StatusTarget, Vec<Message>> {
    let mut grouped: HashMap<StatusTarget, Vec<Message>> = HashMap::new();
    for message in messages {
        let target = match message.container {
            ContainerRef::Conversation(_) => StatusTarget::Sender(message.sender_id),
            ContainerRef::Group(id) | ContainerRef::Channel(id) => StatusTarget::Room(id),
        };
        grouped.entry(target).or_default().push(message.clone());
    }
    grouped
}
