//! Room membership table.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

/// Concurrent map of room name to member client ids.
///
/// Joining is idempotent, leaving a room one is not in does nothing, and a
/// room disappears with its last member. Reads return snapshots, so callers
/// never hold the lock while acting on the result.
#[derive(Debug, Default)]
pub struct RoomHub {
    rooms: RwLock<HashMap<String, HashSet<String>>>,
}

impl RoomHub {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `client_id` to `room`. Returns false if it was already a member.
    pub fn join(&self, client_id: &str, room: &str) -> bool {
        let added = self
            .rooms
            .write()
            .entry(room.to_string())
            .or_default()
            .insert(client_id.to_string());
        if added {
            debug!(room, client_id, "Client joined room");
        }
        added
    }

    /// Removes `client_id` from `room`. Returns false if it was not a member.
    pub fn leave(&self, client_id: &str, room: &str) -> bool {
        let mut rooms = self.rooms.write();
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(client_id);
        if members.is_empty() {
            rooms.remove(room);
            debug!(room, "Removed empty room");
        }
        removed
    }

    /// Removes `client_id` from every room and returns the rooms it left.
    pub fn leave_all(&self, client_id: &str) -> Vec<String> {
        let mut rooms = self.rooms.write();
        let mut left = Vec::new();
        rooms.retain(|room, members| {
            if members.remove(client_id) {
                left.push(room.clone());
            }
            !members.is_empty()
        });
        left.sort();
        left
    }

    /// Returns the members of `room`, sorted.
    pub fn members(&self, room: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .rooms
            .read()
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Returns the number of members in `room`.
    pub fn count(&self, room: &str) -> usize {
        self.rooms.read().get(room).map_or(0, HashSet::len)
    }

    /// Returns true if `client_id` is in `room`.
    pub fn is_member(&self, room: &str, client_id: &str) -> bool {
        self.rooms
            .read()
            .get(room)
            .is_some_and(|members| members.contains(client_id))
    }

    /// Returns every non-empty room, sorted.
    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.rooms.read().keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Returns the rooms `client_id` is in, sorted.
    pub fn rooms_of(&self, client_id: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .rooms
            .read()
            .iter()
            .filter(|(_, members)| members.contains(client_id))
            .map(|(room, _)| room.clone())
            .collect();
        rooms.sort();
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_is_idempotent() {
        let hub = RoomHub::new();
        assert!(hub.join("c1", "lobby"));
        assert!(!hub.join("c1", "lobby"));
        assert_eq!(hub.count("lobby"), 1);

        assert!(hub.leave("c1", "lobby"));
        assert_eq!(hub.count("lobby"), 0);
        assert!(hub.rooms().is_empty());
    }

    #[test]
    fn test_leave_non_member_is_noop() {
        let hub = RoomHub::new();
        hub.join("c1", "lobby");
        assert!(!hub.leave("c2", "lobby"));
        assert!(!hub.leave("c1", "nowhere"));
        assert_eq!(hub.members("lobby"), vec!["c1".to_string()]);
    }

    #[test]
    fn test_count_tracks_distinct_members() {
        let hub = RoomHub::new();
        hub.join("a", "r");
        hub.join("b", "r");
        hub.join("a", "r");
        hub.join("c", "r");
        hub.leave("b", "r");
        assert_eq!(hub.count("r"), 2);
        assert_eq!(hub.members("r"), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_leave_all() {
        let hub = RoomHub::new();
        hub.join("c1", "a");
        hub.join("c1", "b");
        hub.join("c2", "b");

        assert_eq!(hub.leave_all("c1"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(hub.rooms(), vec!["b".to_string()]);
        assert!(hub.rooms_of("c1").is_empty());
        assert!(hub.is_member("b", "c2"));
    }

    #[test]
    fn test_unknown_room_reads() {
        let hub = RoomHub::new();
        assert_eq!(hub.count("ghost"), 0);
        assert!(hub.members("ghost").is_empty());
        assert!(!hub.is_member("ghost", "c1"));
    }
}
