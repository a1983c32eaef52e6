use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use bson::oid::ObjectId;
use futures::{SinkExt, StreamExt};
use parley_db::models::ContainerKind;
use parley_services::{
    AuthenticatedRequest,
    realtime::{Connection, ServerEvent, events},
};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::ApiError,
    routes::{ContainerRefBody, message::MarkSeenRequest},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct AckData {
    ack_id: String,
}

#[derive(Debug, Deserialize)]
struct RoomJoinData {
    container: ContainerRefBody,
}

/// The token is checked before the upgrade; a bad one never reaches the registry.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match state.auth.authenticate(&params.token) {
        Ok(id) => id,
        Err(e) => return ApiError::from(e).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: ObjectId) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let connection = Connection::new(user_id, tx.clone());
    let connection_id = connection.id.clone();
    info!(?user_id, %connection_id, "WebSocket connected");

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if sink.send(Message::text(event.to_json())).await.is_err() {
                break;
            }
        }
    });

    let rooms = match state.containers.room_refs_for(user_id).await {
        Ok(rooms) => rooms,
        Err(e) => {
            warn!(?user_id, %e, "Failed to load rooms");
            Vec::new()
        }
    };
    state
        .presence
        .attach(connection, rooms.iter().map(|room| room.id()));
    let _ = tx.send(ServerEvent::new(
        events::CONNECTED,
        serde_json::json!({
            "user_id": user_id.to_hex(),
            "connection_id": connection_id,
        }),
    ));

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_client_message(&state, user_id, &tx, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(?user_id, %connection_id, %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    state.presence.unregister_connection(user_id, &connection_id);
    writer.abort();
    info!(?user_id, %connection_id, "WebSocket disconnected");
}

async fn handle_client_message(
    state: &AppState,
    user_id: ObjectId,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    text: &str,
) {
    let parsed: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    let msg_type = parsed.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let data = parsed.get("data").cloned().unwrap_or(Value::Null);
    debug!(?user_id, msg_type, "WS message received");

    let result = match msg_type {
        "ping" => {
            let _ = tx.send(ServerEvent::new(events::PONG, Value::Null));
            Ok(())
        }
        "ack" => handle_ack(state, data),
        "room:join" => handle_room_join(state, user_id, data).await,
        "message:seen" => handle_seen(state, user_id, data).await,
        _ => {
            debug!(?user_id, msg_type, "Unknown WS message type");
            Ok(())
        }
    };

    if let Err(e) = result {
        let _ = tx.send(ServerEvent::new(
            events::ERROR,
            serde_json::json!({ "type": msg_type, "message": e.message() }),
        ));
    }
}

fn handle_ack(state: &AppState, data: Value) -> Result<(), ApiError> {
    let ack: AckData = parse_data(data)?;
    if !state.presence.acknowledge(&ack.ack_id) {
        debug!(ack_id = %ack.ack_id, "Late or unknown ack");
    }
    Ok(())
}

async fn handle_room_join(state: &AppState, user_id: ObjectId, data: Value) -> Result<(), ApiError> {
    let body: RoomJoinData = parse_data(data)?;
    let container = body.container.parse()?;
    if container.kind() == ContainerKind::Conversation {
        return Err(ApiError::BadRequest(
            "Conversations are delivered directly".to_string(),
        ));
    }
    state.containers.ensure_member(container, user_id).await?;
    state.presence.join_room(container.id(), user_id);
    Ok(())
}

async fn handle_seen(state: &AppState, user_id: ObjectId, data: Value) -> Result<(), ApiError> {
    let body: MarkSeenRequest = parse_data(data)?;
    let request = AuthenticatedRequest::new(user_id, body.parse()?);
    let updated = state.receipts.mark_seen(request).await?;
    debug!(?user_id, updated = updated.len(), "Marked seen over WS");
    Ok(())
}

fn parse_data<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, ApiError> {
    serde_json::from_value(data).map_err(|e| ApiError::BadRequest(e.to_string()))
}
