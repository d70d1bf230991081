//! Room registry: which connections are viewing which canvas.
//!
//! Purely process-local presence. Nothing here is persisted; clients rebuild
//! it by rejoining after a restart.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

/// Presence map from room (file ID) to member connection IDs.
///
/// Empty rooms are removed as soon as their last member leaves.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection_id` to `room`, returning the new member count.
    ///
    /// Joining a room twice is harmless.
    pub fn join(&self, room: &str, connection_id: &str) -> usize {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let members = rooms.entry(room.to_string()).or_default();
        members.insert(connection_id.to_string());
        members.len()
    }

    /// Remove `connection_id` from `room`.
    ///
    /// Returns the remaining member count, or `None` if the connection was
    /// not a member.
    pub fn leave(&self, room: &str, connection_id: &str) -> Option<usize> {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let members = rooms.get_mut(room)?;
        if !members.remove(connection_id) {
            return None;
        }
        let remaining = members.len();
        if remaining == 0 {
            rooms.remove(room);
        }
        Some(remaining)
    }

    /// Remove `connection_id` from every room it is in.
    ///
    /// Returns `(room, remaining count)` for each room left.
    pub fn leave_all(&self, connection_id: &str) -> Vec<(String, usize)> {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let mut left = Vec::new();
        rooms.retain(|room, members| {
            if members.remove(connection_id) {
                left.push((room.clone(), members.len()));
            }
            !members.is_empty()
        });
        left
    }

    /// Number of members in `room`.
    #[must_use]
    pub fn count(&self, room: &str) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.get(room).map_or(0, HashSet::len)
    }

    /// Whether `connection_id` is a member of `room`.
    #[must_use]
    pub fn is_member(&self, room: &str, connection_id: &str) -> bool {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms
            .get(room)
            .is_some_and(|members| members.contains(connection_id))
    }

    /// Snapshot of the members of `room`.
    #[must_use]
    pub fn members(&self, room: &str) -> Vec<String> {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total memberships across all rooms.
    #[must_use]
    pub fn member_total(&self) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.values().map(HashSet::len).sum()
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.len()
    }
}
