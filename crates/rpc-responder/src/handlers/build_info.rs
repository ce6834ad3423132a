//! Build info handler.

use rpc_protocol::{Request, Response};
use serde::Serialize;
use tracing::debug;

use crate::dispatcher::{Handler, HandlerOutcome, HandlerResult};

/// Build metadata reported under the `buildinfo` result field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_date: Option<&'static str>,
}

impl BuildInfo {
    /// Metadata captured at compile time. `GIT_COMMIT` and `BUILD_DATE`
    /// are optional build environment variables.
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_commit: option_env!("GIT_COMMIT"),
            build_date: option_env!("BUILD_DATE"),
        }
    }
}

pub struct BuildInfoHandler;

impl Handler for BuildInfoHandler {
    fn handle(&self, _request: &Request) -> HandlerResult {
        debug!("BuildInfoHandler");

        let mut response = Response::ok();
        response.put_value("buildinfo", serde_json::to_value(BuildInfo::current())?)?;
        Ok(HandlerOutcome::reply(response))
    }
}
