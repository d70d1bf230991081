//! Error types for the canvas session.

use canvas_core::{CanvasError, ElementId};
use thiserror::Error;

/// Errors talking to the HTTP API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL, or a path built from it, is invalid.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport failure or an undecodable body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("{message} (HTTP {status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The `error` field of the response body, or the status text.
        message: String,
    },
}

impl ClientError {
    /// Whether the server reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// Errors on the relay connection.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The WebSocket handshake or transport failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection is gone; nothing more can be sent.
    #[error("relay connection closed")]
    Closed,

    /// A frame could not be encoded or decoded.
    #[error("relay frame error: {0}")]
    Frame(#[from] serde_json::Error),
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// HTTP API failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Relay failure.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// No canvas has been activated yet.
    #[error("no active canvas")]
    NoActiveCanvas,

    /// The element is not in the local list.
    #[error("element not found: {0}")]
    ElementNotFound(ElementId),

    /// A code operation targeted a non-code element.
    #[error("element {0} is not a code block")]
    NotCodeBlock(ElementId),

    /// A local patch was rejected.
    #[error(transparent)]
    Patch(#[from] CanvasError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
