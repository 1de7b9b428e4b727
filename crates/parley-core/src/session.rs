//! Client sessions.
//!
//! A session drives one connection through
//! `Connecting -> Registered -> ReceivingLoop -> Closed`:
//!
//! - [`Session::connect`] reserves the name. A taken name never gets past
//!   `Connecting`; the caller reports the error before upgrading.
//! - [`Session::run`] reads, decodes and routes messages until the peer goes
//!   away or a message cannot be handled.
//! - Closing leaves every room the session joined, unregisters the client and
//!   closes the connection. It runs exactly once, and a session dropped before
//!   closing is still removed from the registries.

use parley_protocol::{codec, Envelope, ProtocolError, RawFrame};
use parley_transport::{Connection, Incoming, TransportError};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::client::Client;
use crate::error::{RegistryError, RouteError};
use crate::router::{Routed, Router};

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The name could not be registered.
    #[error(transparent)]
    Rejected(#[from] RegistryError),

    /// An inbound message could not be decoded.
    #[error("Invalid message format: {0}")]
    Decode(#[from] ProtocolError),

    /// A message could not be routed.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// The envelope reported to the peer for this error.
    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        Envelope::system(self.to_string())
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Name not yet reserved.
    Connecting,
    /// Name reserved, loop not started.
    Registered,
    /// Reading and routing messages.
    ReceivingLoop,
    /// Terminal. Registrations and memberships are gone.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Registered => "registered",
            SessionState::ReceivingLoop => "receiving",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection.
    PeerClosed,
    /// Reading from the connection failed.
    ReadFailed(String),
    /// A message could not be decoded.
    DecodeFailed(String),
    /// A message could not be routed.
    RouteFailed(String),
}

impl CloseReason {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::ReadFailed(_) => "read_failed",
            CloseReason::DecodeFailed(_) => "decode_failed",
            CloseReason::RouteFailed(_) => "route_failed",
        }
    }
}

/// Counters for a finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Direct messages delivered.
    pub direct: u64,
    /// Room messages broadcast.
    pub broadcast: u64,
    /// Join and leave commands handled.
    pub membership: u64,
    /// Broadcasts that missed at least one member.
    pub partial_failures: u64,
}

/// Summary returned when a session ends.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Client display name.
    pub name: String,
    /// Why the session ended.
    pub reason: CloseReason,
    /// Message counters.
    pub stats: SessionStats,
}

/// Kind of a routed inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Direct message to a named client.
    Direct,
    /// Room broadcast.
    Broadcast,
    /// Join or leave command.
    Membership,
}

impl MessageKind {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Direct => "direct",
            MessageKind::Broadcast => "room",
            MessageKind::Membership => "membership",
        }
    }
}

/// Receives per-message outcomes while a session runs.
pub trait SessionObserver: Send + Sync {
    /// A message was routed. Incomplete broadcasts are reported here too.
    fn message_routed(&self, kind: MessageKind);

    /// A broadcast missed at least one member.
    fn delivery_incomplete(&self, error: &RouteError);
}

/// A single client's connection lifecycle.
pub struct Session {
    router: Arc<Router>,
    client: Arc<Client>,
    rooms: BTreeSet<String>,
    state: SessionState,
    stats: SessionStats,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Session {
    /// Reserve `name` for a new client on `connection`.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if the name is taken, invalid, or the server is full.
    /// The connection is left untouched; reporting the error is up to the caller.
    pub fn connect(
        router: Arc<Router>,
        name: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<Self, SessionError> {
        let client = Arc::new(Client::new(name, connection));

        if let Err(e) = router.clients().register(Arc::clone(&client)) {
            debug!(client = %name, error = %e, "Connection rejected");
            return Err(e.into());
        }

        debug!(
            client = %name,
            id = %client.id(),
            from = %SessionState::Connecting,
            to = %SessionState::Registered,
            "Session state"
        );

        Ok(Self {
            router,
            client,
            rooms: BTreeSet::new(),
            state: SessionState::Registered,
            stats: SessionStats::default(),
            observer: None,
        })
    }

    /// Report every routed message to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Counters for the messages handled so far.
    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the registered client.
    #[must_use]
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Rooms joined through this session.
    #[must_use]
    pub fn rooms(&self) -> &BTreeSet<String> {
        &self.rooms
    }

    /// Run the receive loop until the session ends, then close it.
    pub async fn run<I>(mut self, incoming: &mut I) -> SessionSummary
    where
        I: Incoming + ?Sized,
    {
        self.transition(SessionState::ReceivingLoop);

        let reason = loop {
            let frame = match incoming.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break CloseReason::PeerClosed,
                Err(e) => {
                    debug!(client = %self.client.name(), error = %e, "Read failed");
                    break CloseReason::ReadFailed(e.to_string());
                }
            };

            if let Err(e) = self.handle(&frame).await {
                let reason = match &e {
                    SessionError::Decode(_) => CloseReason::DecodeFailed(e.to_string()),
                    _ => CloseReason::RouteFailed(e.to_string()),
                };
                self.report(&e).await;
                break reason;
            }
        };

        self.close().await;

        SessionSummary {
            name: self.client.name().to_string(),
            reason,
            stats: self.stats.clone(),
        }
    }

    /// Decode and route one frame.
    async fn handle(&mut self, frame: &RawFrame) -> Result<(), SessionError> {
        let message = codec::decode(frame)?;
        trace!(client = %self.client.name(), ?message, "Received");

        let kind = match self.router.dispatch(&self.client, message).await {
            Ok(Routed::Direct { .. }) => {
                self.stats.direct += 1;
                MessageKind::Direct
            }
            Ok(Routed::Broadcast { .. }) => {
                self.stats.broadcast += 1;
                MessageKind::Broadcast
            }
            Ok(Routed::Joined(membership)) => {
                self.rooms.insert(membership.room);
                self.stats.membership += 1;
                MessageKind::Membership
            }
            Ok(Routed::Left(membership)) => {
                self.rooms.remove(&membership.room);
                self.stats.membership += 1;
                MessageKind::Membership
            }
            Err(e) if e.is_recoverable() => {
                warn!(client = %self.client.name(), error = %e, "Broadcast incomplete");
                self.stats.broadcast += 1;
                self.stats.partial_failures += 1;
                if let Some(observer) = &self.observer {
                    observer.delivery_incomplete(&e);
                }
                MessageKind::Broadcast
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(observer) = &self.observer {
            observer.message_routed(kind);
        }

        Ok(())
    }

    /// Tell the peer why the session is ending.
    async fn report(&self, error: &SessionError) {
        if let Err(e) = self.client.send(&error.to_envelope()).await {
            debug!(client = %self.client.name(), error = %e, "Could not report error to peer");
        }
    }

    /// Enter `Closed`: leave rooms, unregister, close the connection.
    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        for room in std::mem::take(&mut self.rooms) {
            if let Err(e) = self.router.leave(&self.client, &room).await {
                debug!(client = %self.client.name(), room = %room, error = %e, "Leave on close failed");
            }
        }

        self.router.clients().unregister_client(&self.client);

        if let Err(e) = self.client.connection().close().await {
            warn!(client = %self.client.name(), error = %e, "Close failed");
        }

        self.transition(SessionState::Closed);
    }

    fn transition(&mut self, to: SessionState) {
        debug!(
            client = %self.client.name(),
            from = %self.state,
            to = %to,
            "Session state"
        );
        self.state = to;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!(
                client = %self.client.name(),
                state = %self.state,
                "Session dropped before closing"
            );
            self.router.evict(&self.client);
        }
    }
}
