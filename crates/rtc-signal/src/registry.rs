//! Connection registry
//!
//! Maps client ids to their live push channel. At most one channel is
//! registered per client id; a newer connection replaces the older one
//! without closing it. Sends are best-effort: a failed send drops the
//! channel from the registry and the peer falls back to polling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::ChannelError;

/// Outbound half of a client's push channel
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Send one text frame to the client
    async fn send_text(&self, text: String) -> Result<(), ChannelError>;
}

struct Entry {
    id: u64,
    channel: Arc<dyn PushChannel>,
}

#[derive(Default)]
struct Inner {
    connections: DashMap<String, Entry>,
    next_id: AtomicU64,
}

impl Inner {
    /// Remove `client_id` only if it still maps to registration `id`
    fn release(&self, client_id: &str, id: u64) -> bool {
        self.connections
            .remove_if(client_id, |_, entry| entry.id == id)
            .is_some()
    }
}

/// Registry of connected clients
///
/// Cheap to clone; clones share the same map.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open channel for `client_id`
    ///
    /// The caller must only register a channel whose handshake has already
    /// completed. Any previous channel for the same id is replaced. Dropping
    /// the returned guard deregisters this channel, unless it has already
    /// been replaced or removed.
    pub fn connect(&self, client_id: &str, channel: Arc<dyn PushChannel>) -> Registration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .inner
            .connections
            .insert(client_id.to_string(), Entry { id, channel })
            .is_some();

        info!(
            client = %client_id,
            replaced,
            "Client connected. Total connections: {}",
            self.len()
        );

        Registration {
            registry: self.inner.clone(),
            client_id: client_id.to_string(),
            id,
        }
    }

    /// Remove whatever channel is registered for `client_id`
    ///
    /// Calling this for an unknown client is a no-op.
    pub fn disconnect(&self, client_id: &str) {
        if self.inner.connections.remove(client_id).is_some() {
            info!(
                client = %client_id,
                "Client disconnected. Remaining connections: {}",
                self.len()
            );
        }
    }

    /// Send `message` to `client_id` if it is connected
    ///
    /// Returns true if the message was handed to the channel. On failure
    /// the channel is treated as dead and removed.
    pub async fn send_if_present(&self, client_id: &str, message: String) -> bool {
        // Clone the handle out so no shard lock is held across the await
        let (id, channel) = match self.inner.connections.get(client_id) {
            Some(entry) => (entry.id, entry.channel.clone()),
            None => return false,
        };

        match channel.send_text(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(client = %client_id, "Error sending message: {}", e);
                if self.inner.release(client_id, id) {
                    info!(
                        client = %client_id,
                        "Client disconnected. Remaining connections: {}",
                        self.len()
                    );
                }
                false
            }
        }
    }

    /// Check if `client_id` has a registered channel
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.inner.connections.contains_key(client_id)
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.connections.is_empty()
    }
}

/// Guard for one registered channel
///
/// Deregisters on drop, so every exit path of a session cleans up.
pub struct Registration {
    registry: Arc<Inner>,
    client_id: String,
    id: u64,
}

impl Registration {
    /// Check if this registration is still the active one for its client
    pub fn is_active(&self) -> bool {
        self.registry
            .connections
            .get(&self.client_id)
            .map_or(false, |entry| entry.id == self.id)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.release(&self.client_id, self.id) {
            info!(
                client = %self.client_id,
                "Client disconnected. Remaining connections: {}",
                self.registry.connections.len()
            );
        }
    }
}
