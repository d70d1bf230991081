//! File and folder tree that owns canvases.
//!
//! Each file entry points at one canvas in the [`CanvasStore`]. Deleting an
//! entry cascades to its descendants and their canvases.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::StoreError;
use crate::{current_timestamp_ms, CanvasStore};

const FILES_NAME: &str = "files.json";

/// Whether an entry is a file (owns a canvas) or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// A document with a canvas.
    File,
    /// A container for other entries.
    Folder,
}

/// One node of the file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Generated identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// File or folder.
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Parent folder, `None` for root entries.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Canvas key, present on file entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_id: Option<String>,
    /// Creation timestamp in milliseconds.
    #[serde(default)]
    pub created_at: u64,
    /// Last change timestamp in milliseconds.
    #[serde(default)]
    pub updated_at: u64,
}

/// The file/folder tree, persisted next to the canvases it owns.
#[derive(Debug, Clone)]
pub struct FileTree {
    entries: Arc<RwLock<Vec<FileEntry>>>,
    store: CanvasStore,
    path: Option<PathBuf>,
}

impl FileTree {
    /// Open the tree stored alongside `store`.
    ///
    /// Uses the store's data directory; an in-memory store yields an
    /// in-memory tree.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Serialization`] if an
    /// existing `files.json` cannot be read.
    pub fn open(store: CanvasStore) -> Result<Self, StoreError> {
        let path = store.data_dir().map(|dir| dir.join(FILES_NAME));
        let entries = match &path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)?;
                serde_json::from_str(&contents)
                    .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))?
            }
            _ => Vec::new(),
        };
        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            store,
            path,
        })
    }

    /// The canvas store this tree cascades into.
    #[must_use]
    pub fn store(&self) -> &CanvasStore {
        &self.store
    }

    /// All entries, folders first, then by name.
    #[must_use]
    pub fn list(&self) -> Vec<FileEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        sorted(entries.iter().cloned().collect())
    }

    /// Entries directly under `parent_id` (`None` for the root).
    #[must_use]
    pub fn list_children(&self, parent_id: Option<&str>) -> Vec<FileEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        sorted(
            entries
                .iter()
                .filter(|e| e.parent_id.as_deref() == parent_id)
                .cloned()
                .collect(),
        )
    }

    /// Look up one entry.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<FileEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().find(|e| e.id == id).cloned()
    }

    /// Create a file or folder.
    ///
    /// File entries get a fresh canvas key and an empty canvas in the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] if `parent_id` names no entry, or
    /// a persistence error.
    pub fn create(
        &self,
        name: impl Into<String>,
        kind: FileKind,
        parent_id: Option<String>,
    ) -> Result<FileEntry, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = parent_id.as_deref() {
            if !entries.iter().any(|e| e.id == parent) {
                return Err(StoreError::FileNotFound(parent.to_string()));
            }
        }

        let now = current_timestamp_ms();
        let entry = FileEntry {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            parent_id,
            canvas_id: (kind == FileKind::File).then(|| Uuid::new_v4().to_string()),
            created_at: now,
            updated_at: now,
        };
        if let Some(canvas_id) = &entry.canvas_id {
            self.store.get(canvas_id)?;
        }

        let mut next = entries.clone();
        next.push(entry.clone());
        self.persist(&next)?;
        *entries = next;

        tracing::debug!(id = %entry.id, kind = ?entry.kind, "Created file entry");
        Ok(entry)
    }

    /// Rename an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] if the entry does not exist.
    pub fn rename(&self, id: &str, name: impl Into<String>) -> Result<FileEntry, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        let entry = next
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::FileNotFound(id.to_string()))?;
        entry.name = name.into();
        entry.updated_at = current_timestamp_ms();
        let renamed = entry.clone();

        self.persist(&next)?;
        *entries = next;
        Ok(renamed)
    }

    /// Delete an entry and everything beneath it, including canvases.
    ///
    /// The tree change is committed first. Canvases that then fail to delete
    /// are logged and left orphaned; the entries are still removed.
    ///
    /// Returns the removed entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] if the entry does not exist, or a
    /// persistence error writing the tree (nothing is deleted in that case).
    pub fn delete(&self, id: &str) -> Result<Vec<FileEntry>, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.iter().any(|e| e.id == id) {
            return Err(StoreError::FileNotFound(id.to_string()));
        }

        let mut doomed = vec![id.to_string()];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let parent = doomed[cursor].clone();
            doomed.extend(
                entries
                    .iter()
                    .filter(|e| e.parent_id.as_deref() == Some(parent.as_str()))
                    .map(|e| e.id.clone()),
            );
            cursor += 1;
        }

        let (removed, kept): (Vec<_>, Vec<_>) = entries
            .iter()
            .cloned()
            .partition(|e| doomed.contains(&e.id));

        self.persist(&kept)?;
        *entries = kept;

        // The tree no longer references these canvases; a failed delete only
        // leaves an unreachable record behind.
        for canvas_id in removed.iter().filter_map(|e| e.canvas_id.as_deref()) {
            if let Err(e) = self.store.delete(canvas_id) {
                tracing::warn!(canvas_id = %canvas_id, "Orphaned canvas after file delete: {e}");
            }
        }

        tracing::info!(id = %id, removed = removed.len(), "Deleted file entry");
        Ok(removed)
    }

    fn persist(&self, entries: &[FileEntry]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn sorted(mut entries: Vec<FileEntry>) -> Vec<FileEntry> {
    entries.sort_by(|a, b| {
        let rank = |kind: FileKind| u8::from(kind == FileKind::File);
        rank(a.kind)
            .cmp(&rank(b.kind))
            .then_with(|| a.name.cmp(&b.name))
    });
    entries
}
