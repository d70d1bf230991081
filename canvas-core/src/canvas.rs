//! The canvas document: one per file, holding its elements and viewport.

use serde::{Deserialize, Serialize};

use crate::{current_timestamp_ms, Element, ElementId};

/// A 2D affine viewport transform `[a, b, c, d, e, f]`.
pub type ViewportTransform = [f64; 6];

/// Identity viewport used for new canvases.
pub const IDENTITY_VIEWPORT: ViewportTransform = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Background color used for new canvases.
pub const DEFAULT_BACKGROUND: &str = "#1a1a2e";

/// Canonical canvas document shared by the store, HTTP API and sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    /// Key of the owning file.
    pub file_id: String,
    /// Elements in z-order (also insertion order).
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Viewport transform.
    #[serde(default = "Canvas::default_viewport")]
    pub viewport_transform: ViewportTransform,
    /// Background color.
    #[serde(default = "Canvas::default_background")]
    pub background_color: String,
    /// Creation timestamp in milliseconds.
    #[serde(default)]
    pub created_at: u64,
    /// Last write timestamp in milliseconds.
    #[serde(default)]
    pub updated_at: u64,
}

impl Canvas {
    /// Create an empty canvas with default viewport and background.
    #[must_use]
    pub fn new(file_id: impl Into<String>) -> Self {
        let now = current_timestamp_ms();
        Self {
            file_id: file_id.into(),
            elements: Vec::new(),
            viewport_transform: IDENTITY_VIEWPORT,
            background_color: DEFAULT_BACKGROUND.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    const fn default_viewport() -> ViewportTransform {
        IDENTITY_VIEWPORT
    }

    fn default_background() -> String {
        DEFAULT_BACKGROUND.to_string()
    }

    /// Find an element by ID.
    #[must_use]
    pub fn element(&self, id: &ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| &e.id == id)
    }

    /// Position of the first element with the given ID.
    #[must_use]
    pub fn position(&self, id: &ElementId) -> Option<usize> {
        self.elements.iter().position(|e| &e.id == id)
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the canvas has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Mark the canvas as written now.
    pub fn touch(&mut self) {
        self.updated_at = current_timestamp_ms();
    }
}
