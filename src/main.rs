//! Mikrotik Exporter Binary Entry Point
//!
//! Resolves the device fleet once at startup, then serves Prometheus pulls.
//! Core functionality is provided by the `mikrotik_exporter` library crate.

use clap::{Parser, ValueEnum};
use mikrotik_exporter::{
    collector,
    config::{self, ConfigError, ConfigFile, DeviceFlags},
    discovery::{self, UdpSrvResolver},
    scrape::ScrapeOrchestrator,
    server::{AppState, DEFAULT_METRICS_PATH, create_router},
    session::{DEFAULT_DIAL_TIMEOUT, Dialer, SessionManager, TcpDialer, load_tls_config},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

/// Mikrotik Exporter - Prometheus metrics for RouterOS fleets
#[derive(Parser, Debug)]
#[command(name = "mikrotik-exporter", version, about, long_about = None)]
struct Cli {
    /// Address to serve metrics on
    #[arg(long, default_value = "0.0.0.0:9436", env = "MIKROTIK_LISTEN")]
    listen: SocketAddr,

    /// Path to the YAML device configuration
    #[arg(long, env = "MIKROTIK_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Single device name (without a config file)
    #[arg(long, env = "MIKROTIK_DEVICE")]
    device: Option<String>,

    /// Single device address
    #[arg(long, env = "MIKROTIK_ADDRESS")]
    address: Option<String>,

    /// Single device API port
    #[arg(long, env = "MIKROTIK_DEVICEPORT")]
    deviceport: Option<u16>,

    /// Single device user
    #[arg(long, env = "MIKROTIK_USER")]
    user: Option<String>,

    /// Single device password
    #[arg(long, env = "MIKROTIK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Dial and DNS timeout (e.g. "5s")
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Connect to devices over TLS
    #[arg(long)]
    tls: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// CA certificate (PEM) for verifying devices
    #[arg(long)]
    tls_ca_file: Option<PathBuf>,

    /// Comma-separated collectors to run, in order
    #[arg(long, value_delimiter = ',', env = "MIKROTIK_FEATURES")]
    features: Vec<String>,

    /// Metrics path
    #[arg(long, default_value = DEFAULT_METRICS_PATH)]
    path: String,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn device_flags(&self) -> DeviceFlags {
        DeviceFlags {
            device: self.device.clone(),
            address: self.address.clone(),
            port: self.deviceport,
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }

    fn dialer(&self) -> Result<Arc<dyn Dialer>, ConfigError> {
        let timeout = if self.timeout.is_zero() {
            DEFAULT_DIAL_TIMEOUT
        } else {
            self.timeout
        };

        if !self.tls {
            return Ok(Arc::new(TcpDialer::plain(timeout)));
        }
        if self.insecure {
            tracing::warn!("TLS certificate verification disabled");
        }
        let tls = load_tls_config(self.tls_ca_file.as_deref(), self.insecure)?;
        Ok(Arc::new(TcpDialer::tls(timeout, tls)))
    }
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match cli.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let cli = Cli::parse();
    init_tracing(&cli);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting mikrotik-exporter");

    config::validate_metrics_path(&cli.path)?;

    // Load configuration
    let file = match &cli.config_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            Some(ConfigFile::load(path)?)
        }
        None => None,
    };
    let devices = config::load_devices(file.as_ref(), &cli.device_flags())?;
    let features = config::select_features(&cli.features, file.as_ref());

    // Resolve collectors before touching any device
    let collectors = collector::builtin()
        .resolve(features.as_slice())
        .map_err(ConfigError::from)?;
    tracing::info!(features = %features.join(","), "Collectors resolved");

    let sessions = Arc::new(SessionManager::new(cli.dialer()?));

    // Discovery runs to completion before the first scrape
    let resolver = UdpSrvResolver::new(cli.timeout);
    let devices = discovery::prepare(devices, &sessions, &resolver).await?;
    tracing::info!(devices = devices.len(), "Devices ready");

    let orchestrator = Arc::new(ScrapeOrchestrator::new(devices, collectors, sessions));
    let app = create_router(AppState::new(orchestrator, cli.path.clone())?);

    tracing::info!(listen = %cli.listen, path = %cli.path, "Web server listening");
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
