//! # parley-transport
//!
//! Transport abstraction layer for the Parley messaging server.
//!
//! - **WebSocket** - axum-based, the production transport
//! - **Memory** - channel-backed, for in-process clients and tests
//!
//! ## Transport Abstraction
//!
//! All transports split a connection into a shared write half
//! ([`Connection`]) and an owned read half ([`Incoming`]), allowing the
//! routing core to be protocol-agnostic.
//!
//! ```rust,ignore
//! use parley_transport::{Connection, Incoming};
//!
//! async fn echo(conn: &dyn Connection, incoming: &mut dyn Incoming) {
//!     while let Ok(Some(frame)) = incoming.recv().await {
//!         // Decode and route
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, Incoming, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnection, WebSocketIncoming};
