//! Pub/Sub RPC
//!
//! Request/response calls over a publish/subscribe broker. A requester
//! publishes a request to the well-known request topic with a private
//! correlation token and its own response topic; a responder dispatches
//! the request and publishes the reply back with the same token.
//!
//! - [`rpc_protocol`]: request/response envelopes
//! - [`rpc_transport`]: the transport capability and brokers
//! - [`requester`]: the correlating client

pub mod config;
pub mod requester;

pub use config::{RequestSettings, RequesterConfig};
pub use requester::{CallError, Requester, RequesterOptions};

pub use rpc_protocol;
pub use rpc_transport;
