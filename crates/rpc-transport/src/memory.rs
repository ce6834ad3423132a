//! In-process broker.
//!
//! Every client connected to the same [`MemoryBroker`] sees the others'
//! publishes. Subscriptions take effect as soon as `subscribe` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::message::Message;
use crate::routing::SubscriptionTable;
use crate::topic;
use crate::transport::{Inbound, Transport, TransportError};
use crate::DEFAULT_CHANNEL_CAPACITY;

/// In-memory broker shared by cloned handles.
#[derive(Clone)]
pub struct MemoryBroker {
    table: Arc<Mutex<SubscriptionTable<mpsc::Sender<Message>>>>,
    capacity: usize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a broker whose per-client inbound channels hold `capacity`
    /// messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(SubscriptionTable::new())),
            capacity,
        }
    }

    /// Connect a client and return its transport handle and inbound queue.
    pub fn connect(&self, client_id: impl Into<String>) -> (MemoryTransport, Inbound) {
        let client_id = client_id.into();
        let (sender, receiver) = mpsc::channel(self.capacity);
        let session = self.lock().insert(client_id.clone(), sender);
        debug!(client_id = %client_id, session, "Memory client connected");

        let transport = MemoryTransport {
            broker: self.clone(),
            session,
            client_id,
            connected: AtomicBool::new(true),
        };
        (transport, receiver)
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SubscriptionTable<mpsc::Sender<Message>>> {
        // A poisoned table only means another publisher panicked mid-route;
        // the table itself is still consistent.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver to every matching client. Returns the number of receivers.
    async fn route(&self, message: Message) -> usize {
        let targets = self.lock().targets(&message.topic);
        let mut delivered = 0;
        for (session, sender) in targets {
            if sender.send(message.clone()).await.is_ok() {
                delivered += 1;
            } else {
                debug!(session, topic = %message.topic, "Receiver dropped, message discarded");
            }
        }
        delivered
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A client connection to a [`MemoryBroker`].
pub struct MemoryTransport {
    broker: MemoryBroker,
    session: u64,
    client_id: String,
    connected: AtomicBool,
}

impl MemoryTransport {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, message: Message) -> Result<(), TransportError> {
        self.ensure_connected()?;
        topic::validate_topic(&message.topic)?;

        let topic = message.topic.clone();
        let receivers = self.broker.route(message).await;
        if receivers == 0 {
            warn!(topic = %topic, client_id = %self.client_id, "Message dropped (no subscribers)");
        } else {
            debug!(topic = %topic, receivers, "Message published");
        }
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        topic::validate_filter(filter)?;

        if self.broker.lock().subscribe(self.session, filter) {
            debug!(filter, client_id = %self.client_id, "Subscribed");
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.broker.lock().remove(self.session);
            debug!(client_id = %self.client_id, "Memory client disconnected");
        }
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.broker.lock().remove(self.session);
        }
    }
}
