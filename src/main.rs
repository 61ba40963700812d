//! Webhook receiver binary
//!
//! Serves the replay-protected webhook endpoint backed by the nonce store,
//! plus health endpoints.
//!
//! # Usage
//!
//! ```bash
//! sap-odata-webhook --port 5678 --host 0.0.0.0 --config ./config.toml
//! ```
//!
//! # API Endpoints
//!
//! - `POST /webhook`: Accept a delivery carrying `x-webhook-nonce` and `x-webhook-timestamp`
//! - `GET /ping`: Uptime and version
//! - `GET /health`: Connection pool telemetry

use clap::Parser;
use sap_odata_gateway::cli::{ServerArgs, run_server_mode};
use std::path::PathBuf;

/// Replay-protected webhook receiver for SAP OData integrations
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to ("::" or "0.0.0.0" or an IP address)
    #[arg(long)]
    host: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    run_server_mode(ServerArgs {
        port: cli.port,
        host: cli.host,
        config: cli.config,
        verbose: cli.verbose,
    })
    .await
}
