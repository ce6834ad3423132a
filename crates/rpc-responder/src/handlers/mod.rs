//! Built-in request handlers.
//!
//! Each handler turns a decoded request into a response; argument
//! problems are answered with a 400 naming the argument.

pub mod build_info;
pub mod calculator;
pub mod get_pages;
pub mod quit;

use rpc_protocol::{names, FieldError, Response};

use crate::dispatcher::DispatcherBuilder;

/// Register every built-in handler under its well-known name.
pub fn register_builtin(builder: DispatcherBuilder) -> DispatcherBuilder {
    builder
        .register(names::BUILD_INFO, build_info::BuildInfoHandler)
        .register(names::CALCULATOR, calculator::CalculatorHandler)
        .register(names::GET_PAGES, get_pages::GetPagesHandler)
        .register(names::QUIT, quit::QuitHandler)
}

/// 400 response for a missing or mistyped argument.
pub(crate) fn bad_argument(error: &FieldError) -> Response {
    Response::bad_request(format!(
        "could not find '{}' in arguments: {}",
        error.field(),
        error
    ))
}
