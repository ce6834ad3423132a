//! RPC Responder
//!
//! Subscribes to the request topic, dispatches each request to a handler
//! registered under its function name, and publishes the handler's
//! response to the response topic named by the request's transport
//! metadata.
//!
//! The responder runs until a dispatched request asks it to quit, the
//! process is signalled, or the transport closes.

pub mod config;
pub mod database;
pub mod dispatcher;
pub mod handlers;
pub mod responder;

pub use config::{DbConfig, DbDriver, ResponderConfig};
pub use database::{Database, DatabaseError};
pub use dispatcher::{
    Dispatched, Dispatcher, DispatcherBuilder, Handler, HandlerError, HandlerOutcome, HandlerResult,
};
pub use responder::{
    connect_with_retry, Responder, ResponderError, ResponderState, ResponderSummary, StopReason,
};

/// Client id used when the config does not name one.
pub const DEFAULT_CLIENT_ID: &str = "listener";
