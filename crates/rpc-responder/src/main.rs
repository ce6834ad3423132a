//! RPC Responder Entrypoint
//!
//! Usage: rpc-responder [--config PATH]
//!
//! Connects to the broker, answers requests on the request topic and
//! exits after a `quit` call is answered or the process is interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rpc_responder::{
    connect_with_retry, Database, Dispatcher, Responder, ResponderConfig, ResponderError, StopReason,
    DEFAULT_CLIENT_ID,
};
use rpc_transport::signal::{self, EXIT_CODE_INTERRUPTED};
use rpc_transport::{logging, Gate};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "rpc-responder", version, about = "Answer RPC requests published on the request topic")]
struct Cli {
    /// Config file (default: $PUBSUB_RPC_CONFIG or ~/.config/pubsub-rpc/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();
    let cli = Cli::parse();

    let config = match ResponderConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let cancel = Gate::new();
    if let Err(e) = signal::install(cancel.clone()) {
        error!(error = %e, "Failed to install signal handler");
        return ExitCode::FAILURE;
    }

    let database = match Database::connect(&config.db) {
        Ok(database) => database,
        Err(e) => {
            error!(error = %e, "Failed to open database");
            return ExitCode::FAILURE;
        }
    };

    let code = serve(&config, &cancel).await;

    if let Err(e) = database.close() {
        error!(error = %e, "Failed to close database");
        return ExitCode::FAILURE;
    }
    code
}

async fn serve(config: &ResponderConfig, cancel: &Gate) -> ExitCode {
    let client_id = config.mqtt.client_id_or(DEFAULT_CLIENT_ID);
    info!(server = %config.mqtt.server(), client_id = %client_id, "Connecting");

    let (transport, inbound) = match connect_with_retry(&config.mqtt, &client_id, cancel).await {
        Ok(connected) => connected,
        Err(ResponderError::Cancelled) => return ExitCode::from(EXIT_CODE_INTERRUPTED),
        Err(e) => {
            error!(error = %e, "Failed to connect");
            return ExitCode::FAILURE;
        }
    };

    let responder = Responder::new(Dispatcher::with_builtin_handlers(), Arc::new(transport));
    let retry_delay = Duration::from_secs(config.mqtt.connect_retry_delay_seconds);
    let code = match responder.subscribe(cancel, retry_delay).await {
        Ok(()) => {
            let summary = responder.run(inbound, cancel).await;
            match summary.stop_reason {
                StopReason::QuitRequested => ExitCode::SUCCESS,
                StopReason::Cancelled => ExitCode::from(EXIT_CODE_INTERRUPTED),
                StopReason::TransportClosed => {
                    error!("Connection to broker lost");
                    ExitCode::FAILURE
                }
            }
        }
        Err(ResponderError::Cancelled) => ExitCode::from(EXIT_CODE_INTERRUPTED),
        Err(e) => {
            error!(error = %e, "Failed to subscribe");
            ExitCode::FAILURE
        }
    };

    if let Err(e) = responder.shutdown().await {
        warn!(error = %e, "Disconnect failed");
    }
    code
}
