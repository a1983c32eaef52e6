use std::collections::HashSet;
use std::time::Duration;

use bson::oid::ObjectId;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::ack::AckTracker;
use super::events::{self, ServerEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Client did not acknowledge in time")]
    AckTimeout,
    #[error("Acknowledgment dropped")]
    AckDropped,
}

/// Handle to one live client transport. The socket task owns the receiving end.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub user_id: ObjectId,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    pub fn new(user_id: ObjectId, outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            outbound,
        }
    }

    pub fn send(&self, event: ServerEvent) -> Result<(), RealtimeError> {
        self.outbound
            .send(event)
            .map_err(|_| RealtimeError::ConnectionClosed)
    }
}

/// Who is connected right now, on which connection, and which rooms they
/// listen to. One entry per user; a newer connection replaces the older one.
///
/// Entries leave only on an explicit disconnect. A transport that dies
/// silently stays registered until its socket task notices.
#[derive(Default)]
pub struct PresenceRegistry {
    connections: DashMap<ObjectId, Connection>,
    rooms: DashMap<ObjectId, HashSet<ObjectId>>,
    acks: AckTracker,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps the user to `connection`, returning whatever it replaced.
    pub fn register(&self, connection: Connection) -> Option<Connection> {
        let user_id = connection.user_id;
        let evicted = self.connections.insert(user_id, connection);
        if let Some(ref old) = evicted {
            debug!(?user_id, old_connection = %old.id, "Replaced existing connection");
        }
        info!(?user_id, online = self.connections.len(), "User online");
        self.broadcast_online_users();
        evicted
    }

    /// Connect path for a socket task: register first, then subscribe to
    /// `rooms`. Once registered, a close from the replaced socket no longer
    /// matches and cannot strip the new subscriptions.
    pub fn attach(
        &self,
        connection: Connection,
        rooms: impl IntoIterator<Item = ObjectId>,
    ) -> Option<Connection> {
        let user_id = connection.user_id;
        let evicted = self.register(connection);
        for room in rooms {
            self.join_room(room, user_id);
        }
        evicted
    }

    pub fn unregister(&self, user_id: ObjectId) -> Option<Connection> {
        let removed = self.connections.remove(&user_id).map(|(_, c)| c);
        self.leave_rooms(user_id);
        if removed.is_some() {
            info!(?user_id, online = self.connections.len(), "User offline");
        }
        self.broadcast_online_users();
        removed
    }

    /// Disconnect path for a socket task. Only removes the entry when it
    /// still points at this connection, so a late close from a replaced
    /// socket cannot evict its successor.
    pub fn unregister_connection(&self, user_id: ObjectId, connection_id: &str) -> bool {
        let removed = self
            .connections
            .remove_if(&user_id, |_, c| c.id == connection_id)
            .is_some();
        if removed {
            self.leave_rooms(user_id);
            info!(?user_id, online = self.connections.len(), "User offline");
            self.broadcast_online_users();
        }
        removed
    }

    pub fn lookup(&self, user_id: ObjectId) -> Option<Connection> {
        self.connections.get(&user_id).map(|c| c.value().clone())
    }

    pub fn is_online(&self, user_id: ObjectId) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn online_user_ids(&self) -> Vec<ObjectId> {
        self.connections.iter().map(|r| *r.key()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Presence is global: everyone connected gets the full list.
    pub fn broadcast_online_users(&self) {
        let user_ids: Vec<String> = self.online_user_ids().iter().map(|id| id.to_hex()).collect();
        let event = ServerEvent::new(
            events::ONLINE_USERS,
            serde_json::json!({ "user_ids": user_ids }),
        );
        for connection in self.snapshot() {
            let _ = connection.send(event.clone());
        }
    }

    // --- Rooms ---

    pub fn join_room(&self, room_id: ObjectId, user_id: ObjectId) {
        self.rooms.entry(room_id).or_default().insert(user_id);
    }

    /// For membership changes made outside a socket. Offline users pick up
    /// their rooms when they connect.
    pub fn join_room_if_online(&self, room_id: ObjectId, user_id: ObjectId) -> bool {
        if !self.is_online(user_id) {
            return false;
        }
        self.join_room(room_id, user_id);
        true
    }

    pub fn leave_room(&self, room_id: ObjectId, user_id: ObjectId) {
        if let Some(mut members) = self.rooms.get_mut(&room_id) {
            members.remove(&user_id);
        }
        self.rooms.remove_if(&room_id, |_, members| members.is_empty());
    }

    pub fn leave_rooms(&self, user_id: ObjectId) {
        for mut room in self.rooms.iter_mut() {
            room.value_mut().remove(&user_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }

    pub fn room_members(&self, room_id: ObjectId) -> Vec<ObjectId> {
        self.rooms
            .get(&room_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Sends to every connected room member except `except`. Returns how many
    /// connections accepted the event.
    pub fn publish_to_room(
        &self,
        room_id: ObjectId,
        event: &ServerEvent,
        except: Option<ObjectId>,
    ) -> usize {
        self.room_members(room_id)
            .into_iter()
            .filter(|id| Some(*id) != except)
            .filter_map(|id| self.lookup(id))
            .filter(|c| c.send(event.clone()).is_ok())
            .count()
    }

    pub fn send_to_user(&self, user_id: ObjectId, event: ServerEvent) -> bool {
        self.lookup(user_id)
            .map(|c| c.send(event).is_ok())
            .unwrap_or(false)
    }

    // --- Acknowledged delivery ---

    /// Pushes `event` and waits for the client to echo its `ack_id`.
    pub async fn send_with_ack(
        &self,
        connection: &Connection,
        mut event: ServerEvent,
        timeout: Duration,
    ) -> Result<(), RealtimeError> {
        let (ack_id, rx) = self.acks.register();
        event.ack_id = Some(ack_id.clone());

        if let Err(e) = connection.send(event) {
            self.acks.forget(&ack_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RealtimeError::AckDropped),
            Err(_) => {
                self.acks.forget(&ack_id);
                Err(RealtimeError::AckTimeout)
            }
        }
    }

    pub fn acknowledge(&self, ack_id: &str) -> bool {
        self.acks.resolve(ack_id)
    }

    pub fn pending_acks(&self) -> usize {
        self.acks.pending_count()
    }

    fn snapshot(&self) -> Vec<Connection> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }
}
