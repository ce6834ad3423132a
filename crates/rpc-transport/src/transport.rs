//! Transport trait and errors.

use std::io;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::Message;

/// Inbound messages for one connection, in delivery order.
pub type Inbound = mpsc::Receiver<Message>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Connection closed")]
    Closed,

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Subscription failed: {0}")]
    SubscribeFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// The publish/subscribe capability used by requesters and responders.
///
/// Implementations must allow concurrent `publish` calls from many tasks.
/// Messages matching a subscription are delivered to the [`Inbound`]
/// receiver returned when the connection was made.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a message to `message.topic`.
    async fn publish(&self, message: Message) -> Result<(), TransportError>;

    /// Subscribe to a topic filter.
    ///
    /// Resolves once the subscription is active, so anything published to
    /// a matching topic afterwards is delivered.
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError>;

    /// Close the connection. Inbound delivery ends.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
