//! Durable element store keyed by file ID.
//!
//! [`CanvasStore`] is shared by HTTP handlers and the file tree. Every
//! operation is a single read-modify-write under the store lock, and when a
//! data directory is configured the document is on disk before the call
//! returns. There is no cross-operation transaction: a patch racing a remove
//! of the same element resolves purely by arrival order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::{Canvas, CanvasError, Element, ElementId, ElementPatch, ViewportTransform};

/// Subdirectory of the data directory holding one JSON file per canvas.
const CANVAS_DIR: &str = "canvases";

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested canvas does not exist.
    #[error("Canvas not found: {0}")]
    CanvasNotFound(String),
    /// The requested element does not exist in the canvas.
    #[error("Element not found: {element_id} in canvas {file_id}")]
    ElementNotFound {
        /// Canvas that was searched.
        file_id: String,
        /// Element that was missing.
        element_id: String,
    },
    /// An append would take the canvas past its element limit.
    #[error("Canvas {file_id} already holds the maximum of {limit} elements")]
    ElementLimit {
        /// Canvas that is full.
        file_id: String,
        /// Maximum element count.
        limit: usize,
    },
    /// The requested file or folder entry does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),
    /// A patch could not be applied to an element.
    #[error("Invalid patch: {0}")]
    InvalidPatch(#[from] CanvasError),
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether this error means the addressed record does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CanvasNotFound(_) | Self::ElementNotFound { .. } | Self::FileNotFound(_)
        )
    }
}

/// Thread-safe canvas storage shared across HTTP routes and the file tree.
///
/// # Example
///
/// ```
/// use canvas_core::{CanvasStore, Element, ElementKind};
///
/// let store = CanvasStore::new();
/// let canvas = store.get("file-1").unwrap();
/// assert!(canvas.elements.is_empty());
///
/// let element = Element::new(ElementKind::Circle { radius: 10.0 });
/// let canvas = store.append_element("file-1", element).unwrap();
/// assert_eq!(canvas.elements.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CanvasStore {
    canvases: Arc<RwLock<HashMap<String, Canvas>>>,
    /// Optional data directory for filesystem persistence.
    data_dir: Option<PathBuf>,
}

impl CanvasStore {
    /// Create an in-memory store (no persistence).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted under `data_dir`, loading every saved canvas.
    ///
    /// The directory is created if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created or read,
    /// and [`StoreError::Serialization`] if a saved canvas cannot be parsed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        let canvas_dir = data_dir.join(CANVAS_DIR);
        std::fs::create_dir_all(&canvas_dir)?;

        let mut canvases = HashMap::new();
        for entry in std::fs::read_dir(&canvas_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let canvas = load_canvas(&path)?;
                canvases.insert(canvas.file_id.clone(), canvas);
            }
        }
        tracing::info!(
            "Loaded {} canvases from {}",
            canvases.len(),
            canvas_dir.display()
        );

        Ok(Self {
            canvases: Arc::new(RwLock::new(canvases)),
            data_dir: Some(data_dir),
        })
    }

    /// The data directory, if this store persists to disk.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Get the canvas for `file_id`, creating an empty one if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if a newly created canvas cannot be
    /// persisted. Never fails with not-found.
    pub fn get(&self, file_id: &str) -> Result<Canvas, StoreError> {
        if let Some(canvas) = self.peek(file_id) {
            return Ok(canvas);
        }
        let mut canvases = self
            .canvases
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(canvas) = canvases.get(file_id) {
            return Ok(canvas.clone());
        }
        tracing::debug!(file_id = %file_id, "Creating empty canvas on first access");
        self.commit(&mut canvases, Canvas::new(file_id))
    }

    /// Get the canvas for `file_id` without creating it.
    #[must_use]
    pub fn peek(&self, file_id: &str) -> Option<Canvas> {
        let canvases = self
            .canvases
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        canvases.get(file_id).cloned()
    }

    /// Whether a canvas record exists for `file_id`.
    #[must_use]
    pub fn contains(&self, file_id: &str) -> bool {
        let canvases = self
            .canvases
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        canvases.contains_key(file_id)
    }

    /// Overwrite the whole document, creating it if absent.
    ///
    /// Omitted viewport or background keep their current (or default) value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the document cannot be persisted.
    pub fn replace(
        &self,
        file_id: &str,
        elements: Vec<Element>,
        viewport_transform: Option<ViewportTransform>,
        background_color: Option<String>,
    ) -> Result<Canvas, StoreError> {
        let mut canvases = self
            .canvases
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut canvas = canvases
            .get(file_id)
            .cloned()
            .unwrap_or_else(|| Canvas::new(file_id));
        canvas.elements = elements;
        if let Some(viewport) = viewport_transform {
            canvas.viewport_transform = viewport;
        }
        if let Some(background) = background_color {
            canvas.background_color = background;
        }
        canvas.touch();
        self.commit(&mut canvases, canvas)
    }

    /// Append one element to an existing canvas.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CanvasNotFound`] if the canvas does not exist;
    /// unlike [`CanvasStore::replace`] this never creates it.
    pub fn append_element(&self, file_id: &str, element: Element) -> Result<Canvas, StoreError> {
        self.append_element_within(file_id, element, usize::MAX)
    }

    /// Append one element unless the canvas already holds `limit` elements.
    ///
    /// The limit is checked under the same write lock as the append, so
    /// concurrent appends cannot overshoot it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ElementLimit`] if the canvas is full, otherwise
    /// as [`CanvasStore::append_element`].
    pub fn append_element_within(
        &self,
        file_id: &str,
        element: Element,
        limit: usize,
    ) -> Result<Canvas, StoreError> {
        let mut canvases = self
            .canvases
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut canvas = canvases
            .get(file_id)
            .cloned()
            .ok_or_else(|| StoreError::CanvasNotFound(file_id.to_string()))?;
        if canvas.elements.len() >= limit {
            return Err(StoreError::ElementLimit {
                file_id: file_id.to_string(),
                limit,
            });
        }
        canvas.elements.push(element);
        canvas.touch();
        self.commit(&mut canvases, canvas)
    }

    /// Merge `patch` into the element matching `element_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CanvasNotFound`] or [`StoreError::ElementNotFound`]
    /// if either is missing, and [`StoreError::InvalidPatch`] if the patch
    /// cannot be applied (the stored element is then left unchanged).
    pub fn patch_element(
        &self,
        file_id: &str,
        element_id: &ElementId,
        patch: &ElementPatch,
    ) -> Result<Canvas, StoreError> {
        let mut canvases = self
            .canvases
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut canvas = canvases
            .get(file_id)
            .cloned()
            .ok_or_else(|| StoreError::CanvasNotFound(file_id.to_string()))?;
        let index = canvas
            .position(element_id)
            .ok_or_else(|| StoreError::ElementNotFound {
                file_id: file_id.to_string(),
                element_id: element_id.to_string(),
            })?;
        canvas.elements[index] = patch.apply(&canvas.elements[index])?;
        canvas.touch();
        self.commit(&mut canvases, canvas)
    }

    /// Remove the first element matching `element_id`.
    ///
    /// Removing an absent element is a no-op that returns the canvas
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CanvasNotFound`] if the canvas does not exist.
    pub fn remove_element(
        &self,
        file_id: &str,
        element_id: &ElementId,
    ) -> Result<Canvas, StoreError> {
        let mut canvases = self
            .canvases
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut canvas = canvases
            .get(file_id)
            .cloned()
            .ok_or_else(|| StoreError::CanvasNotFound(file_id.to_string()))?;
        let Some(index) = canvas.position(element_id) else {
            return Ok(canvas);
        };
        canvas.elements.remove(index);
        canvas.touch();
        self.commit(&mut canvases, canvas)
    }

    /// Delete a canvas record and its persisted file.
    ///
    /// Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the persisted file exists but cannot be
    /// removed.
    pub fn delete(&self, file_id: &str) -> Result<bool, StoreError> {
        let mut canvases = self
            .canvases
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = self.canvas_path(file_id) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(canvases.remove(file_id).is_some())
    }

    /// All file IDs that currently have a canvas record.
    #[must_use]
    pub fn file_ids(&self) -> Vec<String> {
        let canvases = self
            .canvases
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        canvases.keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Persist `canvas` and then publish it in memory.
    ///
    /// The map is only updated once the write has succeeded.
    fn commit(
        &self,
        canvases: &mut HashMap<String, Canvas>,
        canvas: Canvas,
    ) -> Result<Canvas, StoreError> {
        self.persist(&canvas)?;
        canvases.insert(canvas.file_id.clone(), canvas.clone());
        Ok(canvas)
    }

    /// Write a canvas to disk as JSON (temp file + rename).
    ///
    /// No-op if the store was created without a data directory.
    fn persist(&self, canvas: &Canvas) -> Result<(), StoreError> {
        let Some(path) = self.canvas_path(&canvas.file_id) else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(canvas)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            tracing::warn!(
                "Failed to persist canvas {} to {}: {e}",
                canvas.file_id,
                path.display()
            );
            StoreError::Io(e)
        })
    }

    fn canvas_path(&self, file_id: &str) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| {
            dir.join(CANVAS_DIR)
                .join(format!("{}.json", encode_file_name(file_id)))
        })
    }
}

fn load_canvas(path: &Path) -> Result<Canvas, StoreError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))
}

/// Encode a file ID as a file name, one-to-one.
///
/// Lowercase ASCII letters, digits and `-` are kept; every other byte
/// (including `_` and uppercase letters, so case-insensitive filesystems
/// cannot merge names) becomes `_` followed by two lowercase hex digits.
pub(crate) fn encode_file_name(file_id: &str) -> String {
    use std::fmt::Write as _;

    let mut name = String::with_capacity(file_id.len());
    for byte in file_id.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
            name.push(char::from(byte));
        } else {
            let _ = write!(name, "_{byte:02x}");
        }
    }
    name
}
