//! Error types for the routing core.

use parley_transport::TransportError;
use std::fmt;
use thiserror::Error;

use crate::client::ClientId;

/// Client registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Another live client holds the name.
    #[error("{0} is already taken, choose another name")]
    NameTaken(String),

    /// No client is registered under the name.
    #[error("Client not found: {0}")]
    NotFound(String),

    /// The name is empty, too long, or contains invalid characters.
    #[error("Invalid name: {0}")]
    InvalidName(&'static str),

    /// Maximum number of clients reached.
    #[error("Maximum number of clients reached")]
    Full,
}

/// A single failed delivery within a room broadcast.
#[derive(Debug)]
pub struct DeliveryFailure {
    /// Identity of the unreachable member.
    pub client_id: ClientId,
    /// Display name of the unreachable member.
    pub name: String,
    /// Why the write failed.
    pub error: TransportError,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.client_id, self.error)
    }
}

/// Routing errors.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The message names neither a recipient nor a room.
    #[error("Message must name a recipient (to) or a room")]
    MissingTarget,

    /// The direct recipient is not connected.
    #[error("Client not found: {0}")]
    RecipientNotFound(String),

    /// The room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// The client is not a member of the room.
    #[error("{client} is not in room {room}")]
    NotAMember {
        /// Room name.
        room: String,
        /// Client display name.
        client: String,
    },

    /// Invalid room name.
    #[error("Invalid room name: {0}")]
    InvalidRoom(&'static str),

    /// Maximum number of rooms reached.
    #[error("Maximum number of rooms reached")]
    RoomLimitReached,

    /// Writing to the direct recipient failed.
    #[error("Delivery to {recipient} failed: {source}")]
    DeliveryFailed {
        /// Recipient display name.
        recipient: String,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// One or more room members could not be reached.
    #[error("Delivery to {} of {attempted} members of {room} failed: {}", .failures.len(), FailureList(.failures))]
    PartialDeliveryFailure {
        /// Room name.
        room: String,
        /// Number of members a delivery was attempted to.
        attempted: usize,
        /// Members that could not be reached.
        failures: Vec<DeliveryFailure>,
    },
}

impl RouteError {
    /// Whether the sender's session may keep running after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RouteError::PartialDeliveryFailure { .. })
    }
}

struct FailureList<'a>(&'a [DeliveryFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_message_lists_members() {
        let err = RouteError::PartialDeliveryFailure {
            room: "lobby".to_string(),
            attempted: 3,
            failures: vec![
                DeliveryFailure {
                    client_id: ClientId::generate(),
                    name: "bob".to_string(),
                    error: TransportError::ConnectionClosed,
                },
                DeliveryFailure {
                    client_id: ClientId::generate(),
                    name: "carol".to_string(),
                    error: TransportError::OutboxFull,
                },
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("Delivery to 2 of 3 members of lobby failed"));
        assert!(message.contains("bob"));
        assert!(message.contains("carol"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_name_taken_message() {
        let err = RegistryError::NameTaken("alice".to_string());
        assert_eq!(err.to_string(), "alice is already taken, choose another name");
    }
}
