//! # Realtime Relay Protocol
//!
//! JSON text frames exchanged between clients and the relay. Every frame
//! carries a `type` tag; every room-scoped frame names its room by `file_id`.
//!
//! ### Client -> Server
//!
//! - `{"type": "join", "file_id": "..."}`
//! - `{"type": "leave", "file_id": "..."}`
//! - `{"type": "element_added", "file_id": "...", "element": {...}}`
//! - `{"type": "element_modified", "file_id": "...", "element": {...}}`
//! - `{"type": "element_deleted", "file_id": "...", "element_id": "..."}`
//! - `{"type": "cursor_move", "file_id": "...", "x": 0, "y": 0, "color": "#fff"}`
//! - `{"type": "canvas_update", "file_id": "...", "elements": [...]}`
//! - `{"type": "ping"}`
//!
//! ### Server -> Client
//!
//! - `{"type": "welcome", "connection_id": "...", "version": "..."}`
//! - `{"type": "user_joined", "file_id": "...", "user_id": "..."}`
//! - `{"type": "user_left", "file_id": "...", "user_id": "..."}`
//! - `{"type": "users_count", "file_id": "...", "count": 2}`
//! - the five relayed events above, each with the sender's `user_id`
//! - `{"type": "pong", "timestamp": 0}`
//! - `{"type": "error", "code": "...", "message": "..."}`

use serde::{Deserialize, Serialize};

use crate::{Element, ElementId};

/// Client-to-relay message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the room of a canvas.
    Join {
        /// Canvas (room) to join.
        file_id: String,
    },
    /// Leave the room of a canvas.
    Leave {
        /// Canvas (room) to leave.
        file_id: String,
    },
    /// An element was created locally.
    ElementAdded {
        /// Room to relay to.
        file_id: String,
        /// The new element.
        element: Element,
    },
    /// An element was changed locally.
    ElementModified {
        /// Room to relay to.
        file_id: String,
        /// The element after the change.
        element: Element,
    },
    /// An element was deleted locally.
    ElementDeleted {
        /// Room to relay to.
        file_id: String,
        /// ID of the deleted element.
        element_id: ElementId,
    },
    /// The local pointer moved.
    CursorMove {
        /// Room to relay to.
        file_id: String,
        /// Canvas X coordinate.
        x: f64,
        /// Canvas Y coordinate.
        y: f64,
        /// Cursor color for this user.
        #[serde(default)]
        color: String,
    },
    /// The whole element list was saved.
    CanvasUpdate {
        /// Room to relay to.
        file_id: String,
        /// Full element snapshot.
        elements: Vec<Element>,
    },
    /// Keepalive.
    Ping,
}

impl ClientMessage {
    /// The room this message is scoped to, if any.
    #[must_use]
    pub fn file_id(&self) -> Option<&str> {
        match self {
            Self::Join { file_id }
            | Self::Leave { file_id }
            | Self::ElementAdded { file_id, .. }
            | Self::ElementModified { file_id, .. }
            | Self::ElementDeleted { file_id, .. }
            | Self::CursorMove { file_id, .. }
            | Self::CanvasUpdate { file_id, .. } => Some(file_id),
            Self::Ping => None,
        }
    }

    /// The wire tag of this message.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::ElementAdded { .. } => "element_added",
            Self::ElementModified { .. } => "element_modified",
            Self::ElementDeleted { .. } => "element_deleted",
            Self::CursorMove { .. } => "cursor_move",
            Self::CanvasUpdate { .. } => "canvas_update",
            Self::Ping => "ping",
        }
    }

    /// Convert an edit or cursor event into the frame relayed to other
    /// room members, tagged with the sender.
    ///
    /// Returns `None` for control messages (`join`, `leave`, `ping`).
    #[must_use]
    pub fn into_relayed(self, user_id: &str) -> Option<ServerMessage> {
        let user_id = user_id.to_string();
        match self {
            Self::ElementAdded { file_id, element } => Some(ServerMessage::ElementAdded {
                file_id,
                element,
                user_id,
            }),
            Self::ElementModified { file_id, element } => Some(ServerMessage::ElementModified {
                file_id,
                element,
                user_id,
            }),
            Self::ElementDeleted {
                file_id,
                element_id,
            } => Some(ServerMessage::ElementDeleted {
                file_id,
                element_id,
                user_id,
            }),
            Self::CursorMove {
                file_id,
                x,
                y,
                color,
            } => Some(ServerMessage::CursorMove {
                file_id,
                x,
                y,
                color,
                user_id,
            }),
            Self::CanvasUpdate { file_id, elements } => Some(ServerMessage::CanvasUpdate {
                file_id,
                elements,
                user_id,
            }),
            Self::Join { .. } | Self::Leave { .. } | Self::Ping => None,
        }
    }
}

/// Relay-to-client message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the connection opens.
    Welcome {
        /// Identity of this connection, used as `user_id` in relayed frames.
        connection_id: String,
        /// Server version.
        version: String,
    },
    /// Another connection joined a room this connection is in.
    UserJoined {
        /// Room.
        file_id: String,
        /// The joining connection.
        user_id: String,
    },
    /// Another connection left a room this connection is in.
    UserLeft {
        /// Room.
        file_id: String,
        /// The departing connection.
        user_id: String,
    },
    /// Current member count of a room.
    UsersCount {
        /// Room.
        file_id: String,
        /// Number of members.
        count: usize,
    },
    /// Relayed element creation.
    ElementAdded {
        /// Room.
        file_id: String,
        /// The new element.
        element: Element,
        /// Sender connection.
        user_id: String,
    },
    /// Relayed element change.
    ElementModified {
        /// Room.
        file_id: String,
        /// The element after the change.
        element: Element,
        /// Sender connection.
        user_id: String,
    },
    /// Relayed element deletion.
    ElementDeleted {
        /// Room.
        file_id: String,
        /// ID of the deleted element.
        element_id: ElementId,
        /// Sender connection.
        user_id: String,
    },
    /// Relayed cursor position.
    CursorMove {
        /// Room.
        file_id: String,
        /// Canvas X coordinate.
        x: f64,
        /// Canvas Y coordinate.
        y: f64,
        /// Cursor color.
        color: String,
        /// Sender connection.
        user_id: String,
    },
    /// Relayed whole-canvas snapshot.
    CanvasUpdate {
        /// Room.
        file_id: String,
        /// Full element snapshot.
        elements: Vec<Element>,
        /// Sender connection.
        user_id: String,
    },
    /// Reply to `ping`.
    Pong {
        /// Server timestamp in milliseconds.
        timestamp: u64,
    },
    /// A frame from this connection could not be handled.
    Error {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl ServerMessage {
    /// Build an error frame.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The room this message is scoped to, if any.
    #[must_use]
    pub fn file_id(&self) -> Option<&str> {
        match self {
            Self::UserJoined { file_id, .. }
            | Self::UserLeft { file_id, .. }
            | Self::UsersCount { file_id, .. }
            | Self::ElementAdded { file_id, .. }
            | Self::ElementModified { file_id, .. }
            | Self::ElementDeleted { file_id, .. }
            | Self::CursorMove { file_id, .. }
            | Self::CanvasUpdate { file_id, .. } => Some(file_id),
            Self::Welcome { .. } | Self::Pong { .. } | Self::Error { .. } => None,
        }
    }

    /// The wire tag of this message.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::UsersCount { .. } => "users_count",
            Self::ElementAdded { .. } => "element_added",
            Self::ElementModified { .. } => "element_modified",
            Self::ElementDeleted { .. } => "element_deleted",
            Self::CursorMove { .. } => "cursor_move",
            Self::CanvasUpdate { .. } => "canvas_update",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}
