//! Message router for Parley.
//!
//! The router owns the client and room registries and decides where each
//! inbound message goes: a direct recipient, every other member of a room, or
//! a membership change. Registry bookkeeping happens under the registry's
//! locks; every connection write happens afterwards, on a snapshot.

use parley_protocol::{Envelope, InboundMessage, RoomAction};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::client::{Client, ClientId, MAX_NAME_LENGTH};
use crate::error::{DeliveryFailure, RouteError};
use crate::registry::ClientRegistry;
use crate::room::{Membership, RoomRegistry};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum number of registered clients.
    pub max_clients: usize,
    /// Maximum number of rooms.
    pub max_rooms: usize,
    /// Maximum display name and room name length in bytes.
    pub max_name_length: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_clients: 100_000,
            max_rooms: 10_000,
            max_name_length: MAX_NAME_LENGTH,
        }
    }
}

/// What a successfully dispatched message did.
#[derive(Debug, Clone)]
pub enum Routed {
    /// Delivered to a single recipient.
    Direct {
        /// Recipient name.
        recipient: String,
    },
    /// Delivered to the other members of a room.
    Broadcast {
        /// Room name.
        room: String,
        /// Number of members reached.
        delivered: usize,
    },
    /// The sender joined a room.
    Joined(Membership),
    /// The sender left a room.
    Left(Membership),
}

/// The central message router.
pub struct Router {
    clients: ClientRegistry,
    rooms: RoomRegistry,
    config: RouterConfig,
}

impl Router {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            clients: ClientRegistry::with_limits(config.max_clients, config.max_name_length),
            rooms: RoomRegistry::with_limits(config.max_rooms, config.max_name_length),
            config,
        }
    }

    /// Get the router configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The client registry.
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// The room registry.
    #[must_use]
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            client_count: self.clients.len(),
            room_count: self.rooms.len(),
            total_memberships: self.rooms.total_memberships(),
        }
    }

    /// Route an inbound message from `sender`.
    ///
    /// Membership commands run first. Otherwise a named recipient wins over a
    /// named room, and a message naming neither is rejected.
    ///
    /// # Errors
    ///
    /// Returns the routing error for the chosen path, or `MissingTarget`.
    pub async fn dispatch(
        &self,
        sender: &Arc<Client>,
        message: InboundMessage,
    ) -> Result<Routed, RouteError> {
        if let Some(action) = message.action {
            let room = message.target_room().ok_or(RouteError::MissingTarget)?;
            return match action {
                RoomAction::Join => self.join(sender, room).await.map(Routed::Joined),
                RoomAction::Leave => self.leave(sender, room).await.map(Routed::Left),
            };
        }

        if let Some(recipient) = message.recipient() {
            let recipient = recipient.to_string();
            self.send_direct(sender, &recipient, message.content).await?;
            return Ok(Routed::Direct { recipient });
        }

        if let Some(room) = message.target_room() {
            let envelope = Envelope::from_sender(sender.name(), message.content.as_str());
            let delivered = self.broadcast(sender.id(), room, &envelope).await?;
            return Ok(Routed::Broadcast {
                room: room.to_string(),
                delivered,
            });
        }

        Err(RouteError::MissingTarget)
    }

    /// Send a message to a single named client.
    ///
    /// # Errors
    ///
    /// Returns `RecipientNotFound` if nobody holds the name, or `DeliveryFailed`
    /// if the write fails.
    pub async fn send_direct(
        &self,
        sender: &Client,
        recipient: &str,
        content: String,
    ) -> Result<(), RouteError> {
        let target = self
            .clients
            .lookup(recipient)
            .map_err(|_| RouteError::RecipientNotFound(recipient.to_string()))?;

        let envelope = Envelope::direct(sender.name(), recipient, content);
        target
            .send(&envelope)
            .await
            .map_err(|source| RouteError::DeliveryFailed {
                recipient: recipient.to_string(),
                source,
            })?;

        trace!(from = %sender.name(), to = %recipient, "Direct message delivered");
        Ok(())
    }

    /// Deliver an envelope to every member of a room except `exclude`.
    ///
    /// Every member is attempted even after a failure. Returns the number of
    /// members reached.
    ///
    /// # Errors
    ///
    /// Returns `RoomNotFound` for an unknown room, or `PartialDeliveryFailure`
    /// listing every member that could not be reached.
    pub async fn broadcast(
        &self,
        exclude: ClientId,
        room: &str,
        envelope: &Envelope,
    ) -> Result<usize, RouteError> {
        let members = self
            .rooms
            .members(room)
            .ok_or_else(|| RouteError::RoomNotFound(room.to_string()))?;

        let recipients: Vec<_> = members.iter().filter(|m| m.id() != exclude).collect();
        deliver(room, &recipients, envelope).await
    }

    /// Add a client to a room and tell the other members.
    ///
    /// # Errors
    ///
    /// Returns an error if the room name is invalid or the room limit is reached.
    /// Notification failures are logged, not returned.
    pub async fn join(&self, client: &Arc<Client>, room: &str) -> Result<Membership, RouteError> {
        let membership = self.rooms.join(room, client)?;

        if membership.changed {
            let notice = Envelope::system(format!("{} entered the room", client.name()));
            self.notify(client, &membership, &notice).await;
        }

        Ok(membership)
    }

    /// Remove a client from a room and tell the remaining members.
    ///
    /// # Errors
    ///
    /// Returns `RoomNotFound` or `NotAMember`. Notification failures are logged,
    /// not returned.
    pub async fn leave(&self, client: &Arc<Client>, room: &str) -> Result<Membership, RouteError> {
        let membership = self.rooms.leave(room, client)?;

        let notice = Envelope::from_sender(
            client.name(),
            format!("{} left the room", client.name()),
        );
        self.notify(client, &membership, &notice).await;

        Ok(membership)
    }

    /// Remove a client from the registry and from every room, without
    /// notifying anyone. Used when a session is torn down without running its
    /// close sequence.
    pub fn evict(&self, client: &Client) {
        let rooms = self.rooms.remove_everywhere(client);
        let unregistered = self.clients.unregister_client(client);
        debug!(
            client = %client.name(),
            rooms = rooms.len(),
            unregistered,
            "Evicted"
        );
    }

    async fn notify(&self, client: &Client, membership: &Membership, notice: &Envelope) {
        let recipients: Vec<_> = membership.others(client.id()).collect();
        if let Err(e) = deliver(&membership.room, &recipients, notice).await {
            warn!(room = %membership.room, error = %e, "Membership notification incomplete");
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Write an envelope to each recipient in turn, collecting failures.
async fn deliver(
    room: &str,
    recipients: &[&Arc<Client>],
    envelope: &Envelope,
) -> Result<usize, RouteError> {
    let mut failures = Vec::new();

    for member in recipients {
        if let Err(error) = member.send(envelope).await {
            debug!(room = %room, client = %member.name(), error = %error, "Delivery failed");
            failures.push(DeliveryFailure {
                client_id: member.id(),
                name: member.name().to_string(),
                error,
            });
        }
    }

    let delivered = recipients.len() - failures.len();
    trace!(room = %room, recipients = delivered, "Broadcast delivered");

    if failures.is_empty() {
        Ok(delivered)
    } else {
        Err(RouteError::PartialDeliveryFailure {
            room: room.to_string(),
            attempted: recipients.len(),
            failures,
        })
    }
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Number of registered clients.
    pub client_count: usize,
    /// Number of rooms, including empty ones.
    pub room_count: usize,
    /// Total number of room memberships.
    pub total_memberships: usize,
}
