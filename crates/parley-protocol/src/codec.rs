//! Codec for encoding envelopes and decoding inbound messages.
//!
//! Text frames carry JSON. Binary frames carry MessagePack with named fields.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Envelope, InboundMessage};

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Wire encoding for outbound envelopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// JSON in text frames.
    #[default]
    Json,
    /// MessagePack in binary frames.
    #[serde(alias = "messagepack")]
    Msgpack,
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" => Ok(Self::Msgpack),
            other => Err(format!("unknown encoding: {other}")),
        }
    }
}

/// A single message as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl RawFrame {
    /// Size of the frame payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            RawFrame::Text(text) => text.len(),
            RawFrame::Binary(data) => data.len(),
        }
    }

    /// Whether the frame payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode an envelope.
///
/// # Errors
///
/// Returns an error if serialization fails or the result is too large.
pub fn encode(envelope: &Envelope, encoding: Encoding) -> Result<RawFrame, ProtocolError> {
    let frame = match encoding {
        Encoding::Json => RawFrame::Text(serde_json::to_string(envelope)?),
        Encoding::Msgpack => RawFrame::Binary(Bytes::from(rmp_serde::to_vec_named(envelope)?)),
    };

    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }

    Ok(frame)
}

/// Decode an inbound message from a frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or not a valid message.
pub fn decode(frame: &RawFrame) -> Result<InboundMessage, ProtocolError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }

    let message = match frame {
        RawFrame::Text(text) => serde_json::from_str(text)?,
        RawFrame::Binary(data) => rmp_serde::from_slice(data)?,
    };

    Ok(message)
}

/// Encode an inbound message. Used by clients, tests and load generators.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_inbound(
    message: &InboundMessage,
    encoding: Encoding,
) -> Result<RawFrame, ProtocolError> {
    Ok(match encoding {
        Encoding::Json => RawFrame::Text(serde_json::to_string(message)?),
        Encoding::Msgpack => RawFrame::Binary(Bytes::from(rmp_serde::to_vec_named(message)?)),
    })
}

/// Decode an envelope from a frame. Used by clients, tests and load generators.
///
/// # Errors
///
/// Returns an error if the frame is not a valid envelope.
pub fn decode_envelope(frame: &RawFrame) -> Result<Envelope, ProtocolError> {
    Ok(match frame {
        RawFrame::Text(text) => serde_json::from_str(text)?,
        RawFrame::Binary(data) => rmp_serde::from_slice(data)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RoomAction;

    #[test]
    fn test_decode_json_text() {
        let frame = RawFrame::Text(r#"{"content":"hi","room":"lobby"}"#.to_string());
        let msg = decode(&frame).unwrap();
        assert_eq!(msg, InboundMessage::room("lobby", "hi"));
    }

    #[test]
    fn test_decode_msgpack_binary() {
        let sent = InboundMessage::join("lobby");
        let frame = encode_inbound(&sent, Encoding::Msgpack).unwrap();
        assert!(matches!(frame, RawFrame::Binary(_)));

        let msg = decode(&frame).unwrap();
        assert_eq!(msg.action, Some(RoomAction::Join));
        assert_eq!(msg.target_room(), Some("lobby"));
    }

    #[test]
    fn test_decode_malformed() {
        let frame = RawFrame::Text("not json".to_string());
        assert!(matches!(decode(&frame), Err(ProtocolError::Json(_))));

        let frame = RawFrame::Binary(Bytes::from_static(&[0xc1]));
        assert!(matches!(decode(&frame), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_too_large() {
        let frame = RawFrame::Text("x".repeat(MAX_FRAME_SIZE + 1));
        assert!(matches!(
            decode(&frame),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_encode_by_encoding() {
        let envelope = Envelope::direct("alice", "bob", "hi");

        let text = encode(&envelope, Encoding::Json).unwrap();
        assert_eq!(
            text,
            RawFrame::Text(r#"{"sender":"alice","receiver":"bob","body":"hi"}"#.to_string())
        );

        let binary = encode(&envelope, Encoding::Msgpack).unwrap();
        assert_eq!(decode_envelope(&binary).unwrap(), envelope);
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("json".parse::<Encoding>(), Ok(Encoding::Json));
        assert_eq!("MsgPack".parse::<Encoding>(), Ok(Encoding::Msgpack));
        assert!("xml".parse::<Encoding>().is_err());
    }
}
