//! Broker reachable over TCP.
//!
//! Frames are single-line JSON objects terminated by `\n`. Binary fields
//! (payload, correlation data) are base64-encoded.

mod broker;
mod client;
mod frame;

pub use broker::{Broker, BrokerConfig};
pub use client::TcpTransport;
pub use frame::{read_frame, write_frame, Frame, MAX_FRAME_SIZE};
