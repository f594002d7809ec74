//! Mikrotik Exporter - Prometheus metrics for RouterOS fleets
//!
//! This crate provides the core of the exporter. It can be used as a library,
//! or run as a standalone binary with the `mikrotik-exporter` executable.
//!
//! # Architecture
//!
//! - **Collectors**: named plug-ins turning RouterOS API replies into metrics
//! - **Sessions**: one lazily dialed, authenticated API session per device
//! - **Discovery**: DNS SRV templates expanded into concrete devices at startup
//! - **Scrape**: one concurrent task per device on every pull
//! - **Server**: Prometheus pull endpoint and liveness probe
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mikrotik_exporter::{collector, discovery, scrape::ScrapeOrchestrator, session};
//!
//! let sessions = Arc::new(session::SessionManager::new(Arc::new(
//!     session::TcpDialer::plain(session::DEFAULT_DIAL_TIMEOUT),
//! )));
//! let collectors = collector::builtin().resolve(&["interface", "resource"])?;
//! let resolver = discovery::UdpSrvResolver::new(session::DEFAULT_DIAL_TIMEOUT);
//! let devices = discovery::prepare(devices, &sessions, &resolver).await?;
//! let orchestrator = ScrapeOrchestrator::new(devices, collectors, sessions);
//! ```

pub mod collector;
pub mod config;
pub mod device;
pub mod discovery;
pub mod metrics;
pub mod parse;
pub mod routeros;
pub mod scrape;
pub mod server;
pub mod session;

pub use collector::{CollectContext, Collector, CollectorError, CollectorRegistry};
pub use config::ConfigError;
pub use device::Device;
pub use discovery::DiscoveryError;
pub use metrics::{MetricDescriptor, MetricKind, MetricSink};
pub use routeros::{ApiClient, ApiError, Reply, Session};
pub use scrape::{ScrapeOrchestrator, ScrapeResult};
pub use session::{ConnectError, SessionManager};
