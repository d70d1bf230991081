//! # Realtime Relay
//!
//! Fans edit and presence events from one connection out to every other
//! connection viewing the same canvas. The relay persists nothing and does
//! no merging; it is not a source of truth. Clients re-fetch the canvas from
//! the store when they join.
//!
//! Each connection is served by one task that handles its inbound frames in
//! order, so a connection's events reach the room in submission order. There
//! is no ordering across connections beyond arrival order, no acknowledgement
//! and no replay. See [`canvas_core::protocol`] for the wire format.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket};
use canvas_core::{current_timestamp_ms, ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::metrics::{
    dec_ws_connections, inc_ws_connections, record_validation_failure, record_ws_message,
    set_room_occupancy,
};
use crate::rooms::RoomRegistry;
use crate::validation::{
    validate_element, validate_element_id, validate_elements, validate_file_id,
    validate_message_size, ValidationError,
};

/// Capacity of the room broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A message published to one room.
#[derive(Debug, Clone)]
pub struct RelayEvent {
    /// Room (file ID) the message is scoped to.
    pub file_id: String,
    /// The message to deliver.
    pub message: ServerMessage,
    /// Connection that must not receive it (the sender).
    pub exclude: Option<String>,
}

/// Shared relay state: presence plus the room broadcast channel.
#[derive(Clone)]
pub struct RelayState {
    rooms: RoomRegistry,
    event_tx: broadcast::Sender<RelayEvent>,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Create relay state with an empty room registry.
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            rooms: RoomRegistry::new(),
            event_tx,
        }
    }

    /// The room registry.
    #[must_use]
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Subscribe to every room event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.event_tx.subscribe()
    }

    /// Publish a message to a room.
    pub fn publish(&self, file_id: &str, message: ServerMessage, exclude: Option<&str>) {
        record_ws_message("outbound", message.type_name());
        let event = RelayEvent {
            file_id: file_id.to_string(),
            message,
            exclude: exclude.map(str::to_string),
        };
        // No receivers just means nobody is connected.
        let _ = self.event_tx.send(event);
    }

    fn announce_count(&self, file_id: &str, count: usize) {
        set_room_occupancy(self.rooms.room_count(), self.rooms.member_total());
        self.publish(
            file_id,
            ServerMessage::UsersCount {
                file_id: file_id.to_string(),
                count,
            },
            None,
        );
    }

    /// Register `connection_id` in a room and notify the room.
    ///
    /// Existing members get `user_joined`; everyone, joiner included, gets
    /// the new `users_count`.
    pub fn join(&self, file_id: &str, connection_id: &str) -> usize {
        let count = self.rooms.join(file_id, connection_id);
        tracing::info!(file_id = %file_id, connection_id = %connection_id, count, "Joined room");
        self.publish(
            file_id,
            ServerMessage::UserJoined {
                file_id: file_id.to_string(),
                user_id: connection_id.to_string(),
            },
            Some(connection_id),
        );
        self.announce_count(file_id, count);
        count
    }

    /// Remove `connection_id` from a room and notify the remaining members.
    ///
    /// Returns `false` if the connection was not a member.
    pub fn leave(&self, file_id: &str, connection_id: &str) -> bool {
        let Some(count) = self.rooms.leave(file_id, connection_id) else {
            return false;
        };
        tracing::info!(file_id = %file_id, connection_id = %connection_id, count, "Left room");
        self.publish(
            file_id,
            ServerMessage::UserLeft {
                file_id: file_id.to_string(),
                user_id: connection_id.to_string(),
            },
            Some(connection_id),
        );
        self.announce_count(file_id, count);
        true
    }

    /// Leave every room `connection_id` is in (abrupt disconnect).
    pub fn disconnect(&self, connection_id: &str) {
        for (file_id, count) in self.rooms.leave_all(connection_id) {
            self.publish(
                &file_id,
                ServerMessage::UserLeft {
                    file_id: file_id.clone(),
                    user_id: connection_id.to_string(),
                },
                Some(connection_id),
            );
            self.announce_count(&file_id, count);
        }
    }
}

/// Per-connection relay logic, independent of the socket.
pub struct RelayConnection {
    state: RelayState,
    connection_id: String,
    joined: HashSet<String>,
}

impl RelayConnection {
    /// Create a connection with a fresh identity.
    #[must_use]
    pub fn new(state: RelayState) -> Self {
        Self::with_id(state, Uuid::new_v4().to_string())
    }

    /// Create a connection with a fixed identity.
    #[must_use]
    pub fn with_id(state: RelayState, connection_id: String) -> Self {
        Self {
            state,
            connection_id,
            joined: HashSet::new(),
        }
    }

    /// This connection's identity, sent to receivers as `user_id`.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Rooms this connection has joined.
    #[must_use]
    pub fn joined_rooms(&self) -> &HashSet<String> {
        &self.joined
    }

    /// The greeting sent when the socket opens.
    #[must_use]
    pub fn welcome(&self) -> ServerMessage {
        ServerMessage::Welcome {
            connection_id: self.connection_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Whether a room event should be delivered to this connection.
    #[must_use]
    pub fn accepts(&self, event: &RelayEvent) -> bool {
        self.joined.contains(&event.file_id)
            && event.exclude.as_deref() != Some(self.connection_id.as_str())
    }

    fn validation_error(err: &ValidationError) -> ServerMessage {
        record_validation_failure(err.kind());
        ServerMessage::error("validation_error", err.to_string())
    }

    /// Handle one raw text frame, returning a direct reply if any.
    pub fn handle_text(&mut self, text: &str) -> Option<ServerMessage> {
        if let Err(e) = validate_message_size(text.len()) {
            tracing::warn!(connection_id = %self.connection_id, "Message rejected: {e}");
            record_validation_failure(e.kind());
            return Some(ServerMessage::error("message_too_large", e.to_string()));
        }

        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle_message(msg),
            Err(e) => {
                tracing::debug!(connection_id = %self.connection_id, "Unparseable frame: {e}");
                Some(ServerMessage::error("parse_error", e.to_string()))
            }
        }
    }

    /// Handle one parsed message, returning a direct reply if any.
    pub fn handle_message(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        record_ws_message("inbound", msg.type_name());

        if let Some(file_id) = msg.file_id() {
            if let Err(e) = validate_file_id(file_id) {
                return Some(Self::validation_error(&e));
            }
        }
        let checked = match &msg {
            ClientMessage::ElementAdded { element, .. }
            | ClientMessage::ElementModified { element, .. } => validate_element(element),
            ClientMessage::ElementDeleted { element_id, .. } => {
                validate_element_id(element_id.as_str())
            }
            ClientMessage::CanvasUpdate { elements, .. } => validate_elements(elements),
            _ => Ok(()),
        };
        if let Err(e) = checked {
            return Some(Self::validation_error(&e));
        }

        match msg {
            ClientMessage::Join { file_id } => {
                self.joined.insert(file_id.clone());
                self.state.join(&file_id, &self.connection_id);
                None
            }
            ClientMessage::Leave { file_id } => {
                self.joined.remove(&file_id);
                self.state.leave(&file_id, &self.connection_id);
                None
            }
            ClientMessage::Ping => Some(ServerMessage::Pong {
                timestamp: current_timestamp_ms(),
            }),
            other => {
                let file_id = other.file_id().map(str::to_string)?;
                let relayed = other.into_relayed(&self.connection_id)?;
                tracing::debug!(
                    connection_id = %self.connection_id,
                    file_id = %file_id,
                    kind = relayed.type_name(),
                    "Relaying"
                );
                self.state
                    .publish(&file_id, relayed, Some(&self.connection_id));
                None
            }
        }
    }

    /// Leave every joined room.
    pub fn close(&mut self) {
        self.joined.clear();
        self.state.disconnect(&self.connection_id);
    }
}

async fn send_message<S>(sender: &mut S, message: &ServerMessage) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize {}: {e}", message.type_name());
            true
        }
    }
}

/// Serve one relay WebSocket until it closes.
pub async fn handle_relay_socket(socket: WebSocket, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();
    let mut connection = RelayConnection::new(state.clone());
    let connection_id = connection.connection_id().to_string();

    // Subscribe before greeting so nothing sent after the welcome is missed.
    let mut event_rx = state.subscribe();
    inc_ws_connections();
    tracing::info!(connection_id = %connection_id, "Relay connection opened");

    if send_message(&mut sender, &connection.welcome()).await {
        loop {
            tokio::select! {
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = connection.handle_text(text.as_str()) {
                                if !send_message(&mut sender, &reply).await {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::warn!(connection_id = %connection_id, "WebSocket error: {e}");
                            break;
                        }
                        _ => {}
                    }
                }

                event = event_rx.recv() => {
                    match event {
                        Ok(event) if connection.accepts(&event) => {
                            if !send_message(&mut sender, &event.message).await {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(
                                connection_id = %connection_id,
                                "Relay connection lagged behind by {n} messages"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    connection.close();
    dec_ws_connections();
    tracing::info!(connection_id = %connection_id, "Relay connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_core::{Element, ElementKind};
    use serde_json::json;

    fn drain(rx: &mut broadcast::Receiver<RelayEvent>) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn delivered(conn: &RelayConnection, events: &[RelayEvent]) -> Vec<&'static str> {
        events
            .iter()
            .filter(|e| conn.accepts(e))
            .map(|e| e.message.type_name())
            .collect()
    }

    #[test]
    fn test_join_notifies_others_and_counts_everyone() {
        let state = RelayState::new();
        let mut rx = state.subscribe();
        let mut a = RelayConnection::with_id(state.clone(), "a".into());
        let mut b = RelayConnection::with_id(state.clone(), "b".into());

        assert!(a.handle_message(ClientMessage::Join { file_id: "f".into() }).is_none());
        let _ = drain(&mut rx);

        b.handle_message(ClientMessage::Join { file_id: "f".into() });
        let events = drain(&mut rx);
        assert_eq!(delivered(&a, &events), vec!["user_joined", "users_count"]);
        assert_eq!(delivered(&b, &events), vec!["users_count"]);
        assert_eq!(state.rooms().count("f"), 2);
    }

    #[test]
    fn test_edit_is_not_echoed_to_sender() {
        let state = RelayState::new();
        let mut rx = state.subscribe();
        let mut a = RelayConnection::with_id(state.clone(), "a".into());
        let mut b = RelayConnection::with_id(state.clone(), "b".into());
        a.handle_message(ClientMessage::Join { file_id: "f".into() });
        b.handle_message(ClientMessage::Join { file_id: "f".into() });
        let _ = drain(&mut rx);

        let element = Element::new(ElementKind::Circle { radius: 2.0 }).with_id("c1");
        a.handle_message(ClientMessage::ElementAdded {
            file_id: "f".into(),
            element,
        });

        let events = drain(&mut rx);
        assert!(delivered(&a, &events).is_empty());
        assert_eq!(delivered(&b, &events), vec!["element_added"]);
        match &events[0].message {
            ServerMessage::ElementAdded { user_id, .. } => assert_eq!(user_id, "a"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_events_stay_in_their_room() {
        let state = RelayState::new();
        let mut rx = state.subscribe();
        let mut a = RelayConnection::with_id(state.clone(), "a".into());
        let mut b = RelayConnection::with_id(state.clone(), "b".into());
        a.handle_message(ClientMessage::Join { file_id: "f1".into() });
        b.handle_message(ClientMessage::Join { file_id: "f2".into() });
        let _ = drain(&mut rx);

        a.handle_message(ClientMessage::CursorMove {
            file_id: "f1".into(),
            x: 1.0,
            y: 2.0,
            color: "#fff".into(),
        });
        let events = drain(&mut rx);
        assert!(delivered(&b, &events).is_empty());
    }

    #[test]
    fn test_leave_notifies_remaining_members() {
        let state = RelayState::new();
        let mut rx = state.subscribe();
        let mut a = RelayConnection::with_id(state.clone(), "a".into());
        let mut b = RelayConnection::with_id(state.clone(), "b".into());
        a.handle_message(ClientMessage::Join { file_id: "f".into() });
        b.handle_message(ClientMessage::Join { file_id: "f".into() });
        let _ = drain(&mut rx);

        a.handle_message(ClientMessage::Leave { file_id: "f".into() });
        let events = drain(&mut rx);
        assert!(delivered(&a, &events).is_empty());
        assert_eq!(delivered(&b, &events), vec!["user_left", "users_count"]);
        assert_eq!(state.rooms().count("f"), 1);
    }

    #[test]
    fn test_close_leaves_every_room() {
        let state = RelayState::new();
        let mut rx = state.subscribe();
        let mut a = RelayConnection::with_id(state.clone(), "a".into());
        let mut b = RelayConnection::with_id(state.clone(), "b".into());
        for file_id in ["f1", "f2"] {
            a.handle_message(ClientMessage::Join { file_id: file_id.into() });
            b.handle_message(ClientMessage::Join { file_id: file_id.into() });
        }
        let _ = drain(&mut rx);

        a.close();
        let events = drain(&mut rx);
        assert_eq!(
            delivered(&b, &events),
            vec!["user_left", "users_count", "user_left", "users_count"]
        );
        assert_eq!(state.rooms().count("f1"), 1);
        assert_eq!(state.rooms().count("f2"), 1);
    }

    #[test]
    fn test_ping_replies_directly() {
        let mut conn = RelayConnection::new(RelayState::new());
        let reply = conn.handle_text(r#"{"type":"ping"}"#);
        assert!(matches!(reply, Some(ServerMessage::Pong { .. })));
    }

    #[test]
    fn test_malformed_frame_errors_to_sender_only() {
        let state = RelayState::new();
        let mut rx = state.subscribe();
        let mut conn = RelayConnection::new(state);
        let reply = conn.handle_text("{not json");
        assert!(matches!(reply, Some(ServerMessage::Error { ref code, .. }) if code == "parse_error"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut conn = RelayConnection::new(RelayState::new());
        let big = "x".repeat(crate::validation::MAX_WS_MESSAGE_SIZE + 1);
        let reply = conn.handle_text(&big);
        assert!(
            matches!(reply, Some(ServerMessage::Error { ref code, .. }) if code == "message_too_large")
        );
    }

    #[test]
    fn test_invalid_file_id_rejected() {
        let state = RelayState::new();
        let mut conn = RelayConnection::new(state.clone());
        let frame = json!({"type": "join", "file_id": "../etc"}).to_string();
        let reply = conn.handle_text(&frame);
        assert!(
            matches!(reply, Some(ServerMessage::Error { ref code, .. }) if code == "validation_error")
        );
        assert_eq!(state.rooms().room_count(), 0);
        assert!(conn.joined_rooms().is_empty());
    }
}
