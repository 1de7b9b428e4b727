//! Client registry.
//!
//! The registry is the authority on which names are in use. A name maps to at
//! most one live client; registering a taken name fails without touching the
//! existing entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::client::{validate_name, Client, MAX_NAME_LENGTH};
use crate::error::RegistryError;

/// Default maximum number of registered clients.
const DEFAULT_MAX_CLIENTS: usize = 100_000;

/// Name-to-client mapping for connected clients.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<Client>>,
    max_clients: usize,
    max_name_length: usize,
}

impl ClientRegistry {
    /// Create an empty registry with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_CLIENTS, MAX_NAME_LENGTH)
    }

    /// Create an empty registry with custom limits.
    #[must_use]
    pub fn with_limits(max_clients: usize, max_name_length: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_clients,
            max_name_length,
        }
    }

    /// Register a client under its display name.
    ///
    /// # Errors
    ///
    /// Returns `NameTaken` if a live client already holds the name, `InvalidName`
    /// if the name fails validation, or `Full` if the registry is at capacity.
    pub fn register(&self, client: Arc<Client>) -> Result<(), RegistryError> {
        validate_name(client.name(), self.max_name_length).map_err(RegistryError::InvalidName)?;

        // Checked before taking the entry lock; `len` visits every shard.
        if self.clients.len() >= self.max_clients {
            return Err(RegistryError::Full);
        }

        match self.clients.entry(client.name().to_string()) {
            Entry::Occupied(_) => Err(RegistryError::NameTaken(client.name().to_string())),
            Entry::Vacant(slot) => {
                debug!(client = %client.name(), id = %client.id(), "Registered");
                slot.insert(client);
                Ok(())
            }
        }
    }

    /// Look up a client by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no client holds the name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Client>, RegistryError> {
        self.clients
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Remove whatever client holds the name. Absent names are a no-op.
    pub fn unregister(&self, name: &str) -> Option<Arc<Client>> {
        let removed = self.clients.remove(name).map(|(_, client)| client);
        if let Some(client) = &removed {
            debug!(client = %name, id = %client.id(), "Unregistered");
        }
        removed
    }

    /// Remove the client only if the name still maps to this identity.
    ///
    /// Returns `true` if the client was removed.
    pub fn unregister_client(&self, client: &Client) -> bool {
        let removed = self
            .clients
            .remove_if(client.name(), |_, current| current.id() == client.id())
            .is_some();
        if removed {
            debug!(client = %client.name(), id = %client.id(), "Unregistered");
        }
        removed
    }

    /// Check if a name is in use.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Names of all registered clients.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
