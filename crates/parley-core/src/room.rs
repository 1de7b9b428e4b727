//! Rooms and the room registry.
//!
//! Rooms are created on first join and are never removed, even when their
//! last member leaves. Membership is keyed by client identity, so a client
//! that reconnects under the same name is a new member.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::client::{validate_room_name, Client, ClientId, MAX_NAME_LENGTH};
use crate::error::RouteError;

/// Default maximum number of rooms.
const DEFAULT_MAX_ROOMS: usize = 10_000;

/// A named group of clients.
#[derive(Debug)]
pub struct Room {
    name: String,
    members: Vec<Arc<Client>>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Get the room name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in join order.
    #[must_use]
    pub fn members(&self) -> &[Arc<Client>] {
        &self.members
    }

    /// Get the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a client is a member.
    #[must_use]
    pub fn contains(&self, id: ClientId) -> bool {
        self.members.iter().any(|m| m.id() == id)
    }

    /// Add a client. Returns `false` if it was already a member.
    pub fn add(&mut self, client: Arc<Client>) -> bool {
        if self.contains(client.id()) {
            return false;
        }
        self.members.push(client);
        true
    }

    /// Remove a client by identity.
    pub fn remove(&mut self, id: ClientId) -> Option<Arc<Client>> {
        let index = self.members.iter().position(|m| m.id() == id)?;
        Some(self.members.remove(index))
    }
}

/// Result of a membership change, captured while the room was locked.
#[derive(Debug, Clone)]
pub struct Membership {
    /// Room name.
    pub room: String,
    /// Whether the room was created by this join.
    pub created: bool,
    /// Whether membership changed. `false` for a repeated join.
    pub changed: bool,
    /// Members after the change, in join order.
    pub members: Vec<Arc<Client>>,
}

impl Membership {
    /// Members other than the given client.
    pub fn others(&self, id: ClientId) -> impl Iterator<Item = &Arc<Client>> {
        self.members.iter().filter(move |m| m.id() != id)
    }
}

/// Room-name-to-room mapping.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
    max_rooms: usize,
    max_name_length: usize,
}

impl RoomRegistry {
    /// Create an empty registry with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ROOMS, MAX_NAME_LENGTH)
    }

    /// Create an empty registry with custom limits.
    #[must_use]
    pub fn with_limits(max_rooms: usize, max_name_length: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            max_rooms,
            max_name_length,
        }
    }

    /// Add a client to a room, creating the room if needed.
    ///
    /// Joining a room twice is a no-op reported with `changed == false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the room name is invalid or the room limit is reached.
    pub fn join(&self, room_name: &str, client: &Arc<Client>) -> Result<Membership, RouteError> {
        validate_room_name(room_name, self.max_name_length).map_err(RouteError::InvalidRoom)?;

        // Checked before taking the entry lock; `len` visits every shard.
        if !self.rooms.contains_key(room_name) && self.rooms.len() >= self.max_rooms {
            return Err(RouteError::RoomLimitReached);
        }

        let mut created = false;
        let mut room = self.rooms.entry(room_name.to_string()).or_insert_with(|| {
            debug!(room = %room_name, "Creating new room");
            created = true;
            Room::new(room_name)
        });

        let changed = room.add(Arc::clone(client));
        if changed {
            debug!(
                room = %room_name,
                client = %client.name(),
                members = room.member_count(),
                "Joined"
            );
        }

        Ok(Membership {
            room: room_name.to_string(),
            created,
            changed,
            members: room.members().to_vec(),
        })
    }

    /// Remove a client from a room. The room stays even if it becomes empty.
    ///
    /// # Errors
    ///
    /// Returns `RoomNotFound` for an unknown room or `NotAMember` if the client
    /// is not in it.
    pub fn leave(&self, room_name: &str, client: &Client) -> Result<Membership, RouteError> {
        let mut room = self
            .rooms
            .get_mut(room_name)
            .ok_or_else(|| RouteError::RoomNotFound(room_name.to_string()))?;

        if room.remove(client.id()).is_none() {
            return Err(RouteError::NotAMember {
                room: room_name.to_string(),
                client: client.name().to_string(),
            });
        }

        debug!(
            room = %room_name,
            client = %client.name(),
            members = room.member_count(),
            "Left"
        );

        Ok(Membership {
            room: room_name.to_string(),
            created: false,
            changed: true,
            members: room.members().to_vec(),
        })
    }

    /// Snapshot of a room's members.
    #[must_use]
    pub fn members(&self, room_name: &str) -> Option<Vec<Arc<Client>>> {
        self.rooms.get(room_name).map(|room| room.members().to_vec())
    }

    /// Remove a client from every room it is in, without notifying anyone.
    ///
    /// Returns the names of the rooms it was removed from.
    pub fn remove_everywhere(&self, client: &Client) -> Vec<String> {
        let mut left = Vec::new();
        for mut room in self.rooms.iter_mut() {
            if room.remove(client.id()).is_some() {
                left.push(room.key().clone());
            }
        }
        left
    }

    /// Check if a room exists.
    #[must_use]
    pub fn exists(&self, room_name: &str) -> bool {
        self.rooms.contains_key(room_name)
    }

    /// Number of rooms, including empty ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Check if no rooms exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Names of all rooms.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }

    /// Total number of memberships across all rooms.
    #[must_use]
    pub fn total_memberships(&self) -> usize {
        self.rooms.iter().map(|e| e.member_count()).sum()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_transport::{memory, Connection};

    fn client(name: &str) -> Arc<Client> {
        let (conn, _incoming, _peer) = memory::pair();
        let conn: Arc<dyn Connection> = Arc::new(conn);
        Arc::new(Client::new(name, conn))
    }

    #[test]
    fn test_join_creates_room() {
        let rooms = RoomRegistry::new();
        let alice = client("alice");

        let membership = rooms.join("lobby", &alice).unwrap();
        assert!(membership.created);
        assert!(membership.changed);
        assert_eq!(membership.members.len(), 1);
        assert!(rooms.exists("lobby"));
    }

    #[test]
    fn test_join_is_idempotent() {
        let rooms = RoomRegistry::new();
        let alice = client("alice");

        rooms.join("lobby", &alice).unwrap();
        let again = rooms.join("lobby", &alice).unwrap();
        assert!(!again.created);
        assert!(!again.changed);
        assert_eq!(rooms.members("lobby").unwrap().len(), 1);
    }

    #[test]
    fn test_membership_is_by_identity() {
        let rooms = RoomRegistry::new();
        let old = client("bob");
        let new = client("bob");

        rooms.join("lobby", &old).unwrap();
        let membership = rooms.join("lobby", &new).unwrap();
        assert!(membership.changed);
        assert_eq!(membership.members.len(), 2);
        assert_eq!(membership.others(new.id()).count(), 1);
    }

    #[test]
    fn test_join_preserves_order() {
        let rooms = RoomRegistry::new();
        for name in ["a", "b", "c"] {
            rooms.join("lobby", &client(name)).unwrap();
        }

        let names: Vec<_> = rooms
            .members("lobby")
            .unwrap()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_leave_errors() {
        let rooms = RoomRegistry::new();
        let alice = client("alice");
        let bob = client("bob");

        assert!(matches!(
            rooms.leave("nowhere", &alice),
            Err(RouteError::RoomNotFound(_))
        ));

        rooms.join("lobby", &alice).unwrap();
        assert!(matches!(
            rooms.leave("lobby", &bob),
            Err(RouteError::NotAMember { .. })
        ));
        assert_eq!(rooms.members("lobby").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_room_persists() {
        let rooms = RoomRegistry::new();
        let alice = client("alice");

        rooms.join("lobby", &alice).unwrap();
        let membership = rooms.leave("lobby", &alice).unwrap();
        assert!(membership.members.is_empty());
        assert!(rooms.exists("lobby"));
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn test_room_limits() {
        let rooms = RoomRegistry::with_limits(1, MAX_NAME_LENGTH);
        let alice = client("alice");

        assert!(matches!(
            rooms.join("$admin", &alice),
            Err(RouteError::InvalidRoom(_))
        ));
        rooms.join("one", &alice).unwrap();
        assert!(matches!(
            rooms.join("two", &alice),
            Err(RouteError::RoomLimitReached)
        ));
        // Existing rooms can still be joined at the limit.
        rooms.join("one", &client("bob")).unwrap();
    }

    #[test]
    fn test_remove_everywhere() {
        let rooms = RoomRegistry::new();
        let alice = client("alice");
        let bob = client("bob");

        rooms.join("one", &alice).unwrap();
        rooms.join("two", &alice).unwrap();
        rooms.join("two", &bob).unwrap();

        let mut left = rooms.remove_everywhere(&alice);
        left.sort();
        assert_eq!(left, ["one", "two"]);
        assert_eq!(rooms.total_memberships(), 1);
    }

    #[test]
    fn test_concurrent_joins_lose_no_updates() {
        let rooms = Arc::new(RoomRegistry::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let rooms = Arc::clone(&rooms);
                std::thread::spawn(move || {
                    rooms.join("lobby", &client(&format!("user-{i}"))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(rooms.members("lobby").unwrap().len(), 16);
    }
}
