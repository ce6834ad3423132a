//! Publish/Subscribe Transport
//!
//! The capability the RPC requester and responder need from a message
//! broker:
//!
//! - [`Transport`]: publish a [`Message`] and subscribe to a topic filter
//! - inbound delivery through a bounded channel handed out at connect time
//! - [`Gate`]: a one-shot, set-once signal with any number of waiters
//!
//! Two implementations are provided: [`MemoryBroker`] for in-process use
//! and tests, and [`TcpTransport`] for talking to a [`tcp::Broker`] over
//! the network.

pub mod config;
pub mod gate;
pub mod logging;
pub mod memory;
pub mod message;
pub mod routing;
pub mod signal;
pub mod tcp;
pub mod topic;
pub mod transport;

pub use config::{ConfigError, MqttConfig};
pub use gate::Gate;
pub use memory::{MemoryBroker, MemoryTransport};
pub use message::{Message, Properties};
pub use tcp::TcpTransport;
pub use transport::{Inbound, Transport, TransportError};

/// Maximum inbound messages buffered per client before publishers wait.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
