//! Transport abstraction traits for Parley.
//!
//! A connection is split in two halves. The write half ([`Connection`]) is
//! shared: the registry hands it to every session that routes a message to
//! this client. The read half ([`Incoming`]) is owned by the session loop.

use async_trait::async_trait;
use parley_protocol::{Envelope, ProtocolError, RawFrame};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The peer is not draining its outbound queue.
    #[error("Outbox full")]
    OutboxFull,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Peer sent a message over the size limit.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Received size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// The write half of a client connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Deliver an envelope to the peer.
    async fn send(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Close the connection gracefully. Closing twice is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}

/// The read half of a client connection.
#[async_trait]
pub trait Incoming: Send {
    /// Receive the next raw message.
    ///
    /// Returns `None` if the peer closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<RawFrame>, TransportError>;
}
