//! fakeadb-server binary: runs the simulated bridge daemon standalone.
//!
//! Devices can be pre-registered through the config file; test harnesses
//! normally embed the library instead and register devices directly.

use clap::Parser;
use fakeadb_server::config::ServerConfig;
use fakeadb_server::{Device, DeviceState, FakeAdbServer};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// fakeadb-server — simulated device-bridge daemon
#[derive(Parser, Debug)]
#[command(name = "fakeadb-server", version, about = "Simulated device-bridge daemon")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Config file path
    #[arg(long, default_value = "fakeadb.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(Some(&config_path), cli.bind.as_deref(), cli.port) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr(),
        "starting fakeadb-server"
    );

    let server = match FakeAdbServer::bind(&config.listen_addr()).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to bind listener");
            std::process::exit(1);
        }
    };

    // Pre-register configured devices.
    for section in &config.devices {
        let state: DeviceState = match section.state.parse() {
            Ok(state) => state,
            Err(e) => {
                warn!(serial = %section.serial, error = %e, "skipping device");
                continue;
            }
        };
        let device = Device::new(&section.serial, section.properties.clone(), state);
        if let Err(e) = server.devices().register(device).await {
            warn!(serial = %section.serial, error = %e, "skipping device");
        }
    }

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("fakeadb-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
