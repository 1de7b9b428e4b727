//! In-process transport.
//!
//! [`pair`] returns the server-side halves of a connection plus a
//! [`MemoryPeer`] that plays the client. Used by tests, benchmarks and
//! embedders that route messages without a network hop.

use async_trait::async_trait;
use parley_protocol::{codec, Encoding, Envelope, InboundMessage, RawFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::traits::{Connection, Incoming, TransportError};

/// Server-side write half of an in-memory connection.
pub struct MemoryConnection {
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    is_open: AtomicBool,
}

/// Server-side read half of an in-memory connection.
pub struct MemoryIncoming {
    receiver: mpsc::UnboundedReceiver<RawFrame>,
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    outgoing: Option<mpsc::UnboundedSender<RawFrame>>,
    incoming: mpsc::UnboundedReceiver<Envelope>,
}

/// Create a connected in-memory pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryIncoming, MemoryPeer) {
    let (env_tx, env_rx) = mpsc::unbounded_channel();
    let (raw_tx, raw_rx) = mpsc::unbounded_channel();

    let connection = MemoryConnection {
        sender: Mutex::new(Some(env_tx)),
        is_open: AtomicBool::new(true),
    };
    let incoming = MemoryIncoming { receiver: raw_rx };
    let peer = MemoryPeer {
        outgoing: Some(raw_tx),
        incoming: env_rx,
    };

    (connection, incoming, peer)
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let guard = self
            .sender
            .lock()
            .map_err(|_| TransportError::SendFailed("connection lock poisoned".into()))?;
        match guard.as_ref() {
            Some(sender) => sender
                .send(envelope.clone())
                .map_err(|_| TransportError::ConnectionClosed),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.is_open.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}

#[async_trait]
impl Incoming for MemoryIncoming {
    async fn recv(&mut self) -> Result<Option<RawFrame>, TransportError> {
        Ok(self.receiver.recv().await)
    }
}

impl MemoryPeer {
    /// Send a raw frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer has disconnected or the server side is gone.
    pub fn send_raw(&self, frame: RawFrame) -> Result<(), TransportError> {
        self.outgoing
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Send a message to the server as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded or the connection is gone.
    pub fn send(&self, message: &InboundMessage) -> Result<(), TransportError> {
        self.send_raw(codec::encode_inbound(message, Encoding::Json)?)
    }

    /// Wait for the next envelope. Returns `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.incoming.recv().await
    }

    /// Take the next envelope if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.incoming.try_recv().ok()
    }

    /// Drain every queued envelope.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Stop accepting envelopes while keeping the connection open.
    ///
    /// Server writes fail from now on, as they would for a stalled client.
    pub fn stop_receiving(&mut self) {
        self.incoming.close();
    }

    /// Stop sending. The server sees a clean close on its next read.
    pub fn disconnect(&mut self) {
        self.outgoing.take();
    }
}
