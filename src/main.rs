//! RPC Request CLI
//!
//! Entry point for the `rpc-request` command-line tool. Sends one request
//! and prints the reply as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pubsub_rpc::{Requester, RequesterConfig};
use rpc_protocol::{names, Request};
use rpc_transport::signal::{self, EXIT_CODE_INTERRUPTED};
use rpc_transport::{logging, Gate, TcpTransport};
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "rpc-request")]
#[command(about = "Send an RPC request over the broker and print the reply", version)]
struct Cli {
    /// Config file (default: $PUBSUB_RPC_CONFIG or ~/.config/pubsub-rpc/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Seconds to wait for the reply (overrides request.timeout_seconds)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a calculator operation
    Calculator {
        /// add, sub, mul or div
        #[arg(long)]
        operation: String,

        #[arg(long, allow_negative_numbers = true)]
        param1: i64,

        #[arg(long, allow_negative_numbers = true)]
        param2: i64,
    },

    /// Ask the responder to shut down
    Quit {
        /// Send quit=false (the responder replies but keeps running)
        #[arg(long)]
        no_quit: bool,
    },

    /// Show the responder's build information
    Buildinfo,

    /// List pages
    GetPages,
}

impl Commands {
    fn request(&self) -> Request {
        match self {
            Commands::Calculator {
                operation,
                param1,
                param2,
            } => {
                let mut request = Request::new(names::CALCULATOR);
                request
                    .put_string("operation", operation.as_str())
                    .put_integer("param1", *param1)
                    .put_integer("param2", *param2);
                request
            }
            Commands::Quit { no_quit } => {
                let mut request = Request::new(names::QUIT);
                request.put_boolean("quit", !no_quit);
                request
            }
            Commands::Buildinfo => Request::new(names::BUILD_INFO),
            Commands::GetPages => Request::new(names::GET_PAGES),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();
    let cli = Cli::parse();

    let config = match RequesterConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            return ExitCode::FAILURE;
        }
    };
    let options = match config.options(cli.timeout) {
        Ok(options) => options,
        Err(e) => {
            error!(error = %e, "Invalid timeout");
            return ExitCode::FAILURE;
        }
    };

    let cancel = Gate::new();
    if let Err(e) = signal::install(cancel.clone()) {
        error!(error = %e, "Failed to install signal handler");
        return ExitCode::FAILURE;
    }

    let connected = tokio::select! {
        biased;
        _ = cancel.wait() => return ExitCode::from(EXIT_CODE_INTERRUPTED),
        connected = TcpTransport::connect(&config.mqtt, &options.client_id) => connected,
    };
    let (transport, inbound) = match connected {
        Ok(connected) => connected,
        Err(e) => {
            error!(server = %config.mqtt.server(), error = %e, "Failed to connect");
            return ExitCode::FAILURE;
        }
    };

    let requester = Requester::start(Arc::new(transport), inbound, options, cancel);
    let request = cli.command.request();
    let code = match requester.call(&request).await {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(json) => {
                println!("{}", json);
                if response.is_ok() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to print reply");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!(function = %request.function, error = %e, "Call failed");
            ExitCode::from(e.exit_code())
        }
    };

    if let Err(e) = requester.disconnect().await {
        warn!(error = %e, "Disconnect failed");
    }
    code
}
