//! Calculator handler.
//!
//! Args: `operation` (`add`, `sub`, `mul`, `div`), `param1`, `param2`.
//! Replies with the integer `result`.

use rpc_protocol::{Request, Response};
use tracing::debug;

use crate::dispatcher::{Handler, HandlerError, HandlerOutcome, HandlerResult};
use crate::handlers::bad_argument;

/// Supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "add" => Some(Self::Add),
            "sub" => Some(Self::Sub),
            "mul" => Some(Self::Mul),
            "div" => Some(Self::Div),
            _ => None,
        }
    }

    /// Apply to two operands with overflow and zero-division checks.
    pub fn apply(self, param1: i64, param2: i64) -> Result<i64, HandlerError> {
        let result = match self {
            Self::Add => param1.checked_add(param2),
            Self::Sub => param1.checked_sub(param2),
            Self::Mul => param1.checked_mul(param2),
            Self::Div => {
                if param2 == 0 {
                    return Err(HandlerError::failed("division by zero"));
                }
                param1.checked_div(param2)
            }
        };
        result.ok_or_else(|| HandlerError::failed("integer overflow"))
    }
}

pub struct CalculatorHandler;

impl Handler for CalculatorHandler {
    fn handle(&self, request: &Request) -> HandlerResult {
        debug!("CalculatorHandler");

        let (operation, param1, param2) = match (
            request.get_string("operation"),
            request.get_integer("param1"),
            request.get_integer("param2"),
        ) {
            (Ok(operation), Ok(param1), Ok(param2)) => (operation, param1, param2),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                return Ok(HandlerOutcome::reply(bad_argument(&e)))
            }
        };

        let operation = Operation::parse(operation)
            .ok_or_else(|| HandlerError::failed(format!("unsupported operation: {}", operation)))?;
        let result = operation.apply(param1, param2)?;

        let mut response = Response::ok();
        response.put_integer("result", result)?;
        Ok(HandlerOutcome::reply(response))
    }
}
