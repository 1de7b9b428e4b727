//! # parley-protocol
//!
//! Wire protocol definitions for the Parley presence and messaging server.
//!
//! Clients send [`InboundMessage`]s naming either a direct recipient (`to`) or
//! a room (`room`), optionally with a membership `action`. The server delivers
//! [`Envelope`]s carrying the sender, the receiver for direct messages, and the
//! body text.
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, Encoding, Envelope, RawFrame};
//!
//! let frame = RawFrame::Text(r#"{"content":"hi","to":"bob"}"#.to_string());
//! let inbound = codec::decode(&frame).unwrap();
//! assert_eq!(inbound.recipient(), Some("bob"));
//!
//! let reply = Envelope::direct("alice", "bob", inbound.content);
//! let encoded = codec::encode(&reply, Encoding::Json).unwrap();
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, encode, Encoding, ProtocolError, RawFrame};
pub use message::{Envelope, InboundMessage, RoomAction};
