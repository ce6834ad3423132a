//! RPC Protocol Types
//!
//! Defines the JSON envelopes exchanged between a requester and a responder
//! over a publish/subscribe transport.
//!
//! A requester publishes a [`Request`] to [`REQUEST_TOPIC`] and waits for a
//! [`Response`] on its private response topic (see [`response_topic`]).
//! Correlation is carried by the transport, never inside the envelope.

pub mod error;
pub mod fields;
pub mod request;
pub mod response;

pub use error::{DecodeError, EncodeError, FieldError};
pub use request::Request;
pub use response::Response;

/// Re-exported so callers can build argument and result maps without a
/// direct `serde_json` dependency.
pub use serde_json::{Map, Value};

/// Well-known topic every responder subscribes to.
pub const REQUEST_TOPIC: &str = "request";

/// Prefix of the private per-client response topic.
pub const RESPONSE_TOPIC_PREFIX: &str = "response";

/// Success status.
pub const STATUS_OK: i32 = 200;

/// Caller/request error status.
pub const STATUS_BAD_REQUEST: i32 = 400;

/// Build the private response topic for a client: `response/<client-id>`.
pub fn response_topic(client_id: &str) -> String {
    format!("{}/{}", RESPONSE_TOPIC_PREFIX, client_id)
}

/// Known function names.
pub mod names {
    pub const QUIT: &str = "quit";
    pub const CALCULATOR: &str = "calculator";
    pub const BUILD_INFO: &str = "buildinfo";
    pub const GET_PAGES: &str = "getPages";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_topic() {
        assert_eq!(response_topic("requester"), "response/requester");
    }
}
