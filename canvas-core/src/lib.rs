//! # Excalicode Canvas Core
//!
//! Shared model for the collaborative whiteboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 canvas-core                 │
//! ├─────────────────────────────────────────────┤
//! │  Model           │  Storage                 │
//! │  - Elements      │  - CanvasStore (per file)│
//! │  - Canvas docs   │  - FileTree (cascade)    │
//! │  - Merge patch   │  - JSON on disk          │
//! ├─────────────────────────────────────────────┤
//! │  Protocol: relay client/server messages     │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod canvas;
pub mod element;
pub mod error;
pub mod files;
pub mod protocol;
pub mod store;

pub use canvas::{Canvas, ViewportTransform, DEFAULT_BACKGROUND, IDENTITY_VIEWPORT};
pub use element::{Element, ElementId, ElementKind, ElementPatch, Style, Transform};
pub use error::{CanvasError, CanvasResult};
pub use files::{FileEntry, FileKind, FileTree};
pub use protocol::{ClientMessage, ServerMessage};
pub use store::{CanvasStore, StoreError};

/// Canvas core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| {
        // Timestamp will not exceed u64 max for millennia
        #[allow(clippy::cast_possible_truncation)]
        {
            d.as_millis() as u64
        }
    })
}
