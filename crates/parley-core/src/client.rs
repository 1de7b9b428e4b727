//! Connected clients.
//!
//! A [`Client`] is a named, connected peer. Its identity is a random UUID
//! generated at registration; two clients that reuse a name one after the
//! other never share an identity.

use parley_protocol::Envelope;
use parley_transport::{Connection, TransportError};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Maximum display name and room name length in bytes.
pub const MAX_NAME_LENGTH: usize = 64;

/// Process-unique client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a random client ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client status. Reserved for away/offline states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClientStatus {
    /// Registered and connected.
    #[default]
    Online,
}

/// Validate a display name or room name.
///
/// # Errors
///
/// Returns an error message if the name is invalid.
pub fn validate_name(name: &str, max_length: usize) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Name cannot be empty");
    }
    if name.len() > max_length {
        return Err("Name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Name contains control characters");
    }
    Ok(())
}

/// Validate a room name. Names starting with `$` are reserved.
///
/// # Errors
///
/// Returns an error message if the name is invalid.
pub fn validate_room_name(name: &str, max_length: usize) -> Result<(), &'static str> {
    validate_name(name, max_length)?;
    if name.starts_with('$') {
        return Err("Room names starting with '$' are reserved");
    }
    Ok(())
}

/// A connected, named client.
pub struct Client {
    id: ClientId,
    name: String,
    status: ClientStatus,
    connection: Arc<dyn Connection>,
}

impl Client {
    /// Create a client with a fresh identity.
    #[must_use]
    pub fn new(name: impl Into<String>, connection: Arc<dyn Connection>) -> Self {
        Self {
            id: ClientId::generate(),
            name: name.into(),
            status: ClientStatus::Online,
            connection,
        }
    }

    /// Get the client identity.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Get the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the client status.
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        self.status
    }

    /// Get the connection handle.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Write an envelope to this client's connection.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.connection.send(envelope).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("open", &self.connection.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_transport::memory;

    #[test]
    fn test_name_validation() {
        assert!(validate_name("alice", MAX_NAME_LENGTH).is_ok());
        assert!(validate_name("", MAX_NAME_LENGTH).is_err());
        assert!(validate_name("bad\nname", MAX_NAME_LENGTH).is_err());
        assert!(validate_name(&"a".repeat(MAX_NAME_LENGTH + 1), MAX_NAME_LENGTH).is_err());
        assert!(validate_name("张三", MAX_NAME_LENGTH).is_ok());
    }

    #[test]
    fn test_room_name_validation() {
        assert!(validate_room_name("lobby", MAX_NAME_LENGTH).is_ok());
        assert!(validate_room_name("$system", MAX_NAME_LENGTH).is_err());
    }

    #[test]
    fn test_clients_get_distinct_ids() {
        let (conn, _incoming, _peer) = memory::pair();
        let conn: Arc<dyn Connection> = Arc::new(conn);
        let first = Client::new("alice", Arc::clone(&conn));
        let second = Client::new("alice", conn);

        assert_ne!(first.id(), second.id());
        assert_eq!(first.status(), ClientStatus::Online);
    }

    #[tokio::test]
    async fn test_client_send() {
        let (conn, _incoming, mut peer) = memory::pair();
        let client = Client::new("bob", Arc::new(conn));

        client.send(&Envelope::system("hello")).await.unwrap();
        assert_eq!(peer.recv().await, Some(Envelope::system("hello")));
    }
}
