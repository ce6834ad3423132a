//! Page listing handler. Returns a fixed listing.

use rpc_protocol::{Request, Response};
use tracing::debug;

use crate::dispatcher::{Handler, HandlerOutcome, HandlerResult};

pub const PAGES: &str = "[ 'one', 'two', 'three' ]";

pub struct GetPagesHandler;

impl Handler for GetPagesHandler {
    fn handle(&self, _request: &Request) -> HandlerResult {
        debug!("GetPagesHandler");

        let mut response = Response::ok();
        response.put_string("result", PAGES)?;
        Ok(HandlerOutcome::reply(response))
    }
}
