//! Server mode CLI logic
//!
//! Contains the core logic for running the webhook receiver.

use crate::{
    Settings,
    config::ConfigLoader,
    server::{AppState, create_app},
    utils::version,
};
use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Arguments for server mode. `None` leaves the configured value in place.
#[derive(Debug, Default)]
pub struct ServerArgs {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects debug and `level`
/// is used as given.
pub fn init_logging(verbose: bool, level: &str) {
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed by an embedding application or test
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Load settings and apply command line overrides
pub fn load_settings(args: &ServerArgs) -> Result<Settings> {
    let config_path = args
        .config
        .clone()
        .or_else(|| ConfigLoader::default_config_path().filter(|p| p.exists()));

    let mut settings = ConfigLoader::new().load(config_path.as_deref())?;

    if let Some(host) = &args.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if args.verbose {
        settings.logging.verbose = true;
    }
    Ok(settings)
}

/// Run server mode with the given arguments
pub async fn run_server_mode(args: ServerArgs) -> Result<()> {
    let settings = load_settings(&args)?;
    init_logging(settings.logging.verbose, &settings.logging.level);

    tracing::info!("Starting {}", version::version_banner());

    let state = AppState::new(settings.clone());
    state.replay.start();
    let replay = state.replay.clone();
    let pool = state.pool.clone();

    let app = create_app(state);

    // Parse address and fall back from IPv6 to IPv4 when needed
    let addr = parse_and_bind_address(&settings.server.host, settings.server.port).await?;

    tracing::info!(
        "Webhook receiver v{} listening on {}",
        version::get_version(),
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    replay.destroy();
    pool.destroy();
    tracing::info!("Webhook receiver stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Parse host string and attempt to bind to the address
///
/// - First try to bind to IPv6 (::)
/// - If that fails, fall back to IPv4 (0.0.0.0)
pub async fn parse_and_bind_address(host: &str, port: u16) -> Result<std::net::SocketAddr> {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

    // Try to parse as IP address first
    if let Ok(ip) = host.parse::<IpAddr>() {
        let addr = SocketAddr::new(ip, port);
        tracing::debug!("Parsed address: {}", addr);
        return Ok(addr);
    }

    // Handle special cases like "::" for IPv6 any
    match host {
        "::" => {
            let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
            tracing::debug!("Using IPv6 any address: {}", addr);

            // Test if we can bind to IPv6
            match tokio::net::TcpListener::bind(addr).await {
                Ok(_) => {
                    tracing::info!("Successfully bound to IPv6 address {}", addr);
                    Ok(addr)
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not listen on [::]:{} (Caused by {}), falling back to 0.0.0.0",
                        port,
                        e
                    );
                    let fallback_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
                    tracing::info!("Using IPv4 fallback address: {}", fallback_addr);
                    Ok(fallback_addr)
                }
            }
        }
        "0.0.0.0" => {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            tracing::info!("Using IPv4 any address: {}", addr);
            Ok(addr)
        }
        _ => {
            anyhow::bail!(
                "Invalid host address: {}. Use '::' for IPv6 or '0.0.0.0' for IPv4",
                host
            );
        }
    }
}
