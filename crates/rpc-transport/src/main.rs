//! Broker Entrypoint
//!
//! Usage: rpc-broker [--listen ADDR] [--username U --password P]
//!
//! Runs a publish/subscribe broker that requesters and responders connect
//! to with the `[mqtt]` settings of their config file. Stops on SIGINT or
//! SIGTERM.

use std::process::ExitCode;

use clap::Parser;
use rpc_transport::logging::init_logging;
use rpc_transport::signal;
use rpc_transport::tcp::{Broker, BrokerConfig};
use rpc_transport::Gate;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rpc-broker")]
#[command(about = "Publish/subscribe broker for RPC requesters and responders", version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:1883")]
    listen: String,

    /// Require this username (with --password)
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Require this password (with --username)
    #[arg(long, requires = "username")]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let shutdown = Gate::new();
    if let Err(e) = signal::install(shutdown.clone()) {
        error!(error = %e, "Failed to install signal handler");
        return ExitCode::FAILURE;
    }

    let listener = match TcpListener::bind(&cli.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %cli.listen, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    let config = BrokerConfig {
        credentials: cli.username.zip(cli.password),
    };
    if let Err(e) = Broker::new(config).serve(listener, shutdown).await {
        error!(error = %e, "Broker failed");
        return ExitCode::FAILURE;
    }

    info!("Broker stopped");
    ExitCode::SUCCESS
}
