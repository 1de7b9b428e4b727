//! WebSocket transport implementation.
//!
//! Built on axum's WebSocket support. The write half is a bounded outbox
//! drained by a writer task, so routing never waits on a slow peer. The outbox
//! exists before the HTTP upgrade completes, which lets the server reserve
//! the client's name first and refuse the upgrade when the name is taken.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_protocol::{codec, Encoding, Envelope, RawFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::traits::{Connection, Incoming, TransportError};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
    /// Number of envelopes that may be queued for a peer.
    pub outbox_capacity: usize,
    /// Encoding used for outbound envelopes.
    pub encoding: Encoding,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024, // 64 KB
            outbox_capacity: 256,
            encoding: Encoding::Json,
        }
    }
}

/// An item queued for the writer task.
#[derive(Debug)]
enum Outgoing {
    Frame(RawFrame),
    Close,
}

/// The write half of a WebSocket connection.
pub struct WebSocketConnection {
    outbox: mpsc::Sender<Outgoing>,
    is_open: Arc<AtomicBool>,
    encoding: Encoding,
    remote_addr: Option<String>,
}

/// Pending outbound queue for a connection that has not been upgraded yet.
pub struct Outbox {
    receiver: mpsc::Receiver<Outgoing>,
    is_open: Arc<AtomicBool>,
    max_message_size: usize,
}

/// Create the write half of a connection and the queue backing it.
///
/// Envelopes sent before [`attach`] is called are buffered and flushed once
/// the socket is available.
#[must_use]
pub fn outbox(
    config: &WebSocketConfig,
    remote_addr: Option<String>,
) -> (WebSocketConnection, Outbox) {
    let (sender, receiver) = mpsc::channel(config.outbox_capacity.max(1));
    let is_open = Arc::new(AtomicBool::new(true));

    let connection = WebSocketConnection {
        outbox: sender,
        is_open: Arc::clone(&is_open),
        encoding: config.encoding,
        remote_addr,
    };
    let outbox = Outbox {
        receiver,
        is_open,
        max_message_size: config.max_message_size,
    };

    (connection, outbox)
}

/// Bind an upgraded socket to its outbox.
///
/// Spawns the writer task and returns the read half.
pub fn attach(socket: WebSocket, outbox: Outbox) -> WebSocketIncoming {
    let (sink, stream) = socket.split();
    let Outbox {
        receiver,
        is_open,
        max_message_size,
    } = outbox;

    tokio::spawn(write_loop(receiver, sink, Arc::clone(&is_open)));

    WebSocketIncoming {
        stream,
        is_open,
        max_message_size,
    }
}

/// Drain the outbox into the socket until closed.
async fn write_loop(
    mut receiver: mpsc::Receiver<Outgoing>,
    mut sink: SplitSink<WebSocket, Message>,
    is_open: Arc<AtomicBool>,
) {
    while let Some(item) = receiver.recv().await {
        match item {
            Outgoing::Frame(frame) => {
                let message = match frame {
                    RawFrame::Text(text) => Message::Text(text),
                    RawFrame::Binary(data) => Message::Binary(data.to_vec()),
                };
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }

    is_open.store(false, Ordering::SeqCst);
    if let Err(e) = sink.close().await {
        trace!(error = %e, "WebSocket close after writer exit");
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let frame = codec::encode(envelope, self.encoding)?;
        self.outbox
            .try_send(Outgoing::Frame(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::OutboxFull,
                mpsc::error::TrySendError::Closed(_) => TransportError::ConnectionClosed,
            })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }

        // Dropping the last handle also stops the writer, so a full queue is fine.
        match self.outbox.try_send(Outgoing::Close) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::ConnectionClosed),
        }
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }
}

/// The read half of a WebSocket connection.
pub struct WebSocketIncoming {
    stream: SplitStream<WebSocket>,
    is_open: Arc<AtomicBool>,
    max_message_size: usize,
}

impl WebSocketIncoming {
    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        if size > self.max_message_size {
            warn!(
                "Message too large: {} bytes (max: {})",
                size, self.max_message_size
            );
            return Err(TransportError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Incoming for WebSocketIncoming {
    async fn recv(&mut self) -> Result<Option<RawFrame>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(Some(RawFrame::Text(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.check_size(data.len())?;
                    return Ok(Some(RawFrame::Binary(Bytes::from(data))));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // axum answers pings itself
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.is_open.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
            }
        }
    }
}
