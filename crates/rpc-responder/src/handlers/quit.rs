//! Quit handler.
//!
//! Replies 200 and asks the responder to stop when `quit` is true. A
//! request with `quit: false` succeeds without stopping anything.

use rpc_protocol::{Request, Response};
use tracing::debug;

use crate::dispatcher::{Handler, HandlerOutcome, HandlerResult};
use crate::handlers::bad_argument;

pub struct QuitHandler;

impl Handler for QuitHandler {
    fn handle(&self, request: &Request) -> HandlerResult {
        debug!("QuitHandler");

        let quit = match request.get_boolean("quit") {
            Ok(quit) => quit,
            Err(e) => return Ok(HandlerOutcome::reply(bad_argument(&e))),
        };

        Ok(HandlerOutcome::reply_then_quit(Response::ok(), quit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use rpc_protocol::names;

    fn dispatcher() -> Dispatcher {
        Dispatcher::builder().register(names::QUIT, QuitHandler).build()
    }

    fn quit_request(args: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({"function": "quit", "args": args})).unwrap()
    }

    #[test]
    fn test_quit_true() {
        let dispatched = dispatcher().dispatch(&quit_request(serde_json::json!({"quit": true})));
        assert_eq!(dispatched.response.status, 200);
        assert!(dispatched.should_quit);
    }

    #[test]
    fn test_quit_false_succeeds_without_quitting() {
        let dispatched = dispatcher().dispatch(&quit_request(serde_json::json!({"quit": false})));
        assert_eq!(dispatched.response.status, 200);
        assert!(!dispatched.should_quit);
    }

    #[test]
    fn test_missing_quit_argument() {
        let dispatched = dispatcher().dispatch(&quit_request(serde_json::json!({})));
        assert_eq!(dispatched.response.status, 400);
        assert!(!dispatched.should_quit);
        assert_eq!(
            dispatched.response.get_message(),
            Some("could not find 'quit' in arguments: field 'quit' is missing")
        );
    }

    #[test]
    fn test_mistyped_quit_argument() {
        let dispatched = dispatcher().dispatch(&quit_request(serde_json::json!({"quit": "yes"})));
        assert_eq!(dispatched.response.status, 400);
        assert!(!dispatched.should_quit);
    }
}
