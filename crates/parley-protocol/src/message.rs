//! Message shapes for the Parley protocol.
//!
//! Clients send [`InboundMessage`]s and receive [`Envelope`]s. Field names are
//! lowercase on the wire; the capitalized spellings used by older clients are
//! accepted on input.

use serde::{Deserialize, Serialize};

/// Room membership command carried by an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomAction {
    /// Join the room named by `room`.
    Join,
    /// Leave the room named by `room`.
    Leave,
}

/// A message sent by a client.
///
/// A well-formed message names exactly one of `to` or `room`. When both are
/// set the direct recipient wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message text.
    #[serde(default, alias = "Content")]
    pub content: String,

    /// Direct recipient name.
    #[serde(default, alias = "To", skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Target room name.
    #[serde(default, alias = "Room", skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    /// Membership command for `room`.
    #[serde(default, alias = "Action", skip_serializing_if = "Option::is_none")]
    pub action: Option<RoomAction>,
}

impl InboundMessage {
    /// Create a direct message.
    #[must_use]
    pub fn direct(to: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            to: Some(to.into()),
            ..Self::default()
        }
    }

    /// Create a room message.
    #[must_use]
    pub fn room(room: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            room: Some(room.into()),
            ..Self::default()
        }
    }

    /// Create a join command.
    #[must_use]
    pub fn join(room: impl Into<String>) -> Self {
        Self {
            room: Some(room.into()),
            action: Some(RoomAction::Join),
            ..Self::default()
        }
    }

    /// Create a leave command.
    #[must_use]
    pub fn leave(room: impl Into<String>) -> Self {
        Self {
            room: Some(room.into()),
            action: Some(RoomAction::Leave),
            ..Self::default()
        }
    }

    /// The direct recipient, if one is named. Empty strings count as absent.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.to.as_deref().filter(|s| !s.is_empty())
    }

    /// The target room, if one is named. Empty strings count as absent.
    #[must_use]
    pub fn target_room(&self) -> Option<&str> {
        self.room.as_deref().filter(|s| !s.is_empty())
    }
}

/// A message delivered to a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender name. Absent for system notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Receiver name. Only set for direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,

    /// Message text.
    pub body: String,
}

impl Envelope {
    /// Envelope for a direct message.
    #[must_use]
    pub fn direct(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: Some(sender.into()),
            receiver: Some(receiver.into()),
            body: body.into(),
        }
    }

    /// Envelope for a room message.
    #[must_use]
    pub fn from_sender(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
            receiver: None,
            body: body.into(),
        }
    }

    /// Server-generated envelope with no sender.
    #[must_use]
    pub fn system(body: impl Into<String>) -> Self {
        Self {
            sender: None,
            receiver: None,
            body: body.into(),
        }
    }

    /// Whether this envelope was generated by the server.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.sender.as_deref().map_or(true, str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_lowercase_fields() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"content":"hi","to":"bob"}"#).unwrap();
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.recipient(), Some("bob"));
        assert_eq!(msg.target_room(), None);
        assert_eq!(msg.action, None);
    }

    #[test]
    fn test_inbound_capitalized_aliases() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"Content":"hello","Room":"lobby"}"#).unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.target_room(), Some("lobby"));
    }

    #[test]
    fn test_inbound_empty_target_is_absent() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"content":"x","to":"","room":""}"#).unwrap();
        assert_eq!(msg.recipient(), None);
        assert_eq!(msg.target_room(), None);
    }

    #[test]
    fn test_inbound_action() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"room":"lobby","action":"join"}"#).unwrap();
        assert_eq!(msg.action, Some(RoomAction::Join));
        assert_eq!(msg.content, "");

        assert!(serde_json::from_str::<InboundMessage>(r#"{"action":"dance"}"#).is_err());
    }

    #[test]
    fn test_envelope_skips_absent_fields() {
        let json = serde_json::to_string(&Envelope::system("bob entered the room")).unwrap();
        assert_eq!(json, r#"{"body":"bob entered the room"}"#);

        let json = serde_json::to_string(&Envelope::direct("alice", "bob", "hi")).unwrap();
        assert_eq!(json, r#"{"sender":"alice","receiver":"bob","body":"hi"}"#);
    }

    #[test]
    fn test_envelope_is_system() {
        assert!(Envelope::system("x").is_system());
        assert!(!Envelope::from_sender("alice", "x").is_system());
    }
}
