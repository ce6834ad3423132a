//! Request dispatcher.
//!
//! Routes decoded requests to the handler registered for their function
//! name. Every failure is turned into a 400 response, so callers always
//! get a well-formed [`Response`] back.

use std::collections::HashMap;

use rpc_protocol::{FieldError, Request, Response};
use tracing::{debug, warn};

use crate::handlers;

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutcome {
    /// `None` is a handler bug; the dispatcher answers 400 "response is null".
    pub response: Option<Response>,
    /// Ask the responder to shut down once this reply is published.
    pub should_quit: bool,
}

impl HandlerOutcome {
    pub fn reply(response: Response) -> Self {
        Self {
            response: Some(response),
            should_quit: false,
        }
    }

    pub fn reply_then_quit(response: Response, should_quit: bool) -> Self {
        Self {
            response: Some(response),
            should_quit,
        }
    }

    pub fn no_response() -> Self {
        Self {
            response: None,
            should_quit: false,
        }
    }
}

/// Handler failures. The dispatcher reports these as
/// `handler '<name>' failed: <detail>`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

pub type HandlerResult = Result<HandlerOutcome, HandlerError>;

/// A request handler.
///
/// Handlers run inline on the responder loop and must not block.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &Request) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&Request) -> HandlerResult + Send + Sync,
{
    fn handle(&self, request: &Request) -> HandlerResult {
        self(request)
    }
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub response: Response,
    pub should_quit: bool,
}

impl Dispatched {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            response: Response::bad_request(message),
            should_quit: false,
        }
    }
}

/// Collects handlers before the dispatcher is frozen.
#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl DispatcherBuilder {
    /// Register `handler` for `function`. A later registration of the same
    /// name replaces the earlier one.
    pub fn register(mut self, function: impl Into<String>, handler: impl Handler + 'static) -> Self {
        let function = function.into();
        if self.handlers.insert(function.clone(), Box::new(handler)).is_some() {
            warn!(function = %function, "Handler replaced");
        }
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers,
        }
    }
}

/// Immutable function-name → handler table.
pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Dispatcher with the built-in handlers (`quit`, `calculator`,
    /// `buildinfo`, `getPages`).
    pub fn with_builtin_handlers() -> Self {
        handlers::register_builtin(Self::builder()).build()
    }

    /// Registered function names, sorted.
    pub fn functions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Decode and dispatch a raw payload.
    pub fn dispatch(&self, payload: &[u8]) -> Dispatched {
        match Request::decode(payload) {
            Ok(request) => self.dispatch_request(&request),
            Err(e) => Dispatched::rejected(format!("request could not be decoded: {}", e)),
        }
    }

    /// Validate and dispatch an already decoded request.
    pub fn dispatch_request(&self, request: &Request) -> Dispatched {
        if request.args.is_none() {
            return Dispatched::rejected("missing request");
        }

        let function = request.function.as_str();
        if function.is_empty() {
            return Dispatched::rejected("empty function");
        }

        let Some(handler) = self.handlers.get(function) else {
            return Dispatched::rejected(format!("unexpected function: {}", function));
        };

        debug!(function, "Dispatching request");
        let outcome = match handler.handle(request) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(function, error = %e, "Handler failed");
                return Dispatched::rejected(format!("handler '{}' failed: {}", function, e));
            }
        };

        match outcome.response {
            Some(response) => Dispatched {
                response,
                should_quit: outcome.should_quit,
            },
            None => {
                warn!(function, "Handler returned no response");
                Dispatched::rejected("response is null")
            }
        }
    }
}
