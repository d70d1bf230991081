//! Error types for canvas model operations.

use thiserror::Error;

/// Result type for canvas model operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur while manipulating elements.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// A patch was not a JSON object.
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// A patch tried to change an element's kind.
    #[error("Element type cannot change from {from} to {to}")]
    TypeChange {
        /// The element's current type tag.
        from: String,
        /// The type tag the patch asked for.
        to: String,
    },

    /// A patch tried to change an element's identifier.
    #[error("Element id cannot change from {from} to {to}")]
    IdChange {
        /// The element's current id.
        from: String,
        /// The id the patch asked for.
        to: String,
    },

    /// Element serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
