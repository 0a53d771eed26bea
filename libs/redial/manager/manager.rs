use crate::core::{Command, ConnectionState, Metrics, Notification, RedialClient};
use crate::traits::{RedialError, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Clients are keyed by their notification prefix
pub type ClientId = String;

/// Registry of [`RedialClient`]s sharing one command surface
///
/// Commands are routed by their prefix, so `FEED::CONNECT` reaches the
/// client configured with prefix `FEED`.
///
/// # Example
/// ```ignore
/// let manager = ClientManager::new();
/// manager.add_client(RedialClient::new(
///     ManagerOptions::builder().prefix("FEED").build()?,
/// ))?;
///
/// let command = Command::parse("FEED::CONNECT", json!({ "url": "wss://api.example.com" }))?;
/// assert!(manager.dispatch(command).await?);
/// ```
pub struct ClientManager {
    clients: Arc<RwLock<HashMap<ClientId, Arc<RedialClient>>>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a client under its prefix
    pub fn add_client(&self, client: RedialClient) -> Result<Arc<RedialClient>> {
        let id = client.prefix().to_string();
        let mut clients = self.clients.write();

        if clients.contains_key(&id) {
            return Err(RedialError::Configuration(format!(
                "Client with prefix '{}' already exists",
                id
            )));
        }

        let client = Arc::new(client);
        clients.insert(id.clone(), Arc::clone(&client));
        info!("Added client '{}'", id);
        Ok(client)
    }

    /// Remove a client and shut it down
    pub async fn remove_client(&self, id: &str) -> Result<()> {
        let client = self.clients.write().remove(id);

        match client {
            Some(client) => {
                debug!("Removing client '{}'", id);
                client.shutdown().await?;
                info!("Removed client '{}'", id);
                Ok(())
            }
            None => Err(RedialError::Configuration(format!(
                "Client '{}' not found",
                id
            ))),
        }
    }

    pub fn get_client(&self, id: &str) -> Option<Arc<RedialClient>> {
        self.clients.read().get(id).cloned()
    }

    /// Route a command to the client owning its prefix
    ///
    /// Returns `Ok(false)` when no client owns the prefix.
    pub async fn dispatch(&self, command: Command) -> Result<bool> {
        let Some(client) = self.get_client(&command.prefix) else {
            debug!("No client for {}, ignoring", command.type_name());
            return Ok(false);
        };
        client.dispatch(command).await
    }

    /// Send a payload through every connected client
    ///
    /// Returns the number of clients that accepted it
    pub async fn broadcast<T: Serialize>(&self, payload: &T) -> usize {
        let clients: Vec<_> = self
            .clients
            .read()
            .iter()
            .filter(|(_, client)| client.is_connected())
            .map(|(id, client)| (id.clone(), Arc::clone(client)))
            .collect();

        let mut count = 0;
        for (id, client) in clients {
            match client.send(payload).await {
                Ok(()) => count += 1,
                Err(e) => warn!("Failed to send to client '{}': {}", id, e),
            }
        }
        count
    }

    /// Drain pending notifications from all clients (non-blocking)
    pub fn collect_events(&self) -> Vec<(ClientId, Notification)> {
        let clients = self.clients.read();
        let mut events = Vec::new();

        for (id, client) in clients.iter() {
            while let Some(event) = client.try_recv_event() {
                events.push((id.clone(), event));
            }
        }

        events
    }

    pub fn get_metrics(&self, id: &str) -> Option<Metrics> {
        self.clients.read().get(id).map(|client| client.metrics())
    }

    pub fn list_clients(&self) -> Vec<ClientId> {
        self.clients.read().keys().cloned().collect()
    }

    /// Connection state of every client
    pub fn get_all_statuses(&self) -> HashMap<ClientId, ConnectionState> {
        self.clients
            .read()
            .iter()
            .map(|(id, client)| (id.clone(), client.connection_state()))
            .collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn connected_count(&self) -> usize {
        self.clients
            .read()
            .values()
            .filter(|c| c.is_connected())
            .count()
    }

    pub fn has_client(&self, id: &str) -> bool {
        self.clients.read().contains_key(id)
    }

    /// Shut down and remove every client
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down client manager");

        let clients = std::mem::take(&mut *self.clients.write());
        for (id, client) in clients {
            debug!("Shutting down client '{}'", id);
            if let Err(e) = client.shutdown().await {
                warn!("Error shutting down client '{}': {}", id, e);
            }
        }

        info!("Client manager shutdown complete");
        Ok(())
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
