//! Scrape orchestration.
//!
//! One pass starts an independent task per device, runs the configured
//! collectors in order against that device's session and always records a
//! duration/success pair for it. A pass returns only after every device task
//! has finished.
//!
//! The pass runs detached from its caller: dropping the future returned by
//! [`ScrapeOrchestrator::collect`] stops waiting for the results but never
//! interrupts a device mid-command.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinSet;

use crate::collector::{CollectContext, Collector, CollectorError};
use crate::device::Device;
use crate::metrics::{MetricDescriptor, MetricKind, MetricSink};
use crate::session::{ConnectError, SessionManager};

/// Failure of one device in one pass.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("collector {collector} failed: {source}")]
    Collector {
        collector: String,
        #[source]
        source: CollectorError,
    },
}

impl ScrapeError {
    /// Whether the device's session must be discarded.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Connect(_) => false,
            Self::Collector { source, .. } => source.is_transport(),
        }
    }
}

/// Outcome of one device in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    pub device: String,
    pub duration: Duration,
    pub success: bool,
}

/// Per-device meta-metric descriptors.
#[derive(Debug)]
struct MetaMetrics {
    duration: MetricDescriptor,
    success: MetricDescriptor,
}

impl MetaMetrics {
    fn new() -> Self {
        Self {
            duration: MetricDescriptor::new(
                "scrape",
                "collector_duration_seconds",
                "mikrotik_exporter: duration of a device scrape",
                &["device"],
                MetricKind::Gauge,
            ),
            success: MetricDescriptor::new(
                "scrape",
                "collector_success",
                "mikrotik_exporter: whether a device scrape succeeded",
                &["device"],
                MetricKind::Gauge,
            ),
        }
    }

    fn record(&self, sink: &MetricSink, device: &str, duration: Duration, success: bool) {
        let labels = [device];
        sink.emit(&self.duration, duration.as_secs_f64(), &labels);
        sink.emit(&self.success, if success { 1.0 } else { 0.0 }, &labels);
    }
}

/// Fans one scrape pass out across all devices.
///
/// The device list and collector set are fixed at construction.
pub struct ScrapeOrchestrator {
    devices: Vec<Arc<Device>>,
    collectors: Arc<[Box<dyn Collector>]>,
    sessions: Arc<SessionManager>,
    meta: Arc<MetaMetrics>,
}

impl std::fmt::Debug for ScrapeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeOrchestrator")
            .field(
                "devices",
                &self.devices.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            )
            .field(
                "collectors",
                &self.collectors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl ScrapeOrchestrator {
    /// Create an orchestrator over resolved devices.
    ///
    /// Discovery templates are skipped; run [`crate::discovery::prepare`] first.
    pub fn new(
        devices: Vec<Device>,
        collectors: Vec<Box<dyn Collector>>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        let devices = devices
            .into_iter()
            .filter(|d| {
                if d.is_template() {
                    tracing::warn!(device = %d.name, "Skipping unresolved discovery template");
                }
                !d.is_template()
            })
            .map(Arc::new)
            .collect();

        Self {
            devices,
            collectors: collectors.into(),
            sessions,
            meta: Arc::new(MetaMetrics::new()),
        }
    }

    /// Devices scraped on every pass.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().map(AsRef::as_ref)
    }

    /// Names of the configured collectors, in run order.
    pub fn collector_names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Every descriptor a pass may emit, meta-metrics included.
    pub fn describe(&self) -> Vec<&MetricDescriptor> {
        let mut descs = vec![&self.meta.duration, &self.meta.success];
        descs.extend(self.collectors.iter().flat_map(|c| c.describe()));
        descs
    }

    /// Run one pass over every device, emitting into `sink`.
    ///
    /// Never fails as a whole: per-device failures are reported through the
    /// success meta-metric and the returned results.
    pub async fn collect(&self, sink: Arc<MetricSink>) -> Vec<ScrapeResult> {
        let pass = Pass {
            devices: self.devices.clone(),
            collectors: Arc::clone(&self.collectors),
            sessions: Arc::clone(&self.sessions),
            meta: Arc::clone(&self.meta),
            sink,
        };

        match tokio::spawn(pass.run()).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(error = %e, "Scrape pass failed");
                Vec::new()
            }
        }
    }
}

/// One pass, owned by its own task.
struct Pass {
    devices: Vec<Arc<Device>>,
    collectors: Arc<[Box<dyn Collector>]>,
    sessions: Arc<SessionManager>,
    meta: Arc<MetaMetrics>,
    sink: Arc<MetricSink>,
}

impl Pass {
    async fn run(self) -> Vec<ScrapeResult> {
        let start = Instant::now();
        let mut tasks = JoinSet::new();
        let mut running = HashMap::with_capacity(self.devices.len());

        for device in &self.devices {
            let task = DeviceScrape {
                device: Arc::clone(device),
                collectors: Arc::clone(&self.collectors),
                sessions: Arc::clone(&self.sessions),
                sink: Arc::clone(&self.sink),
                meta: Arc::clone(&self.meta),
            };
            let id = tasks.spawn(task.run()).id();
            running.insert(id, Arc::clone(device));
        }

        let mut results = Vec::with_capacity(self.devices.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, result)) => results.push(result),
                Err(e) => {
                    let Some(device) = running.remove(&e.id()) else {
                        tracing::error!(error = %e, "Unknown scrape task failed");
                        continue;
                    };
                    tracing::error!(device = %device.name, error = %e, "Device scrape task failed");
                    // The session may have been left mid-command.
                    self.sessions.invalidate(&device).await;

                    let duration = start.elapsed();
                    self.meta.record(&self.sink, &device.name, duration, false);
                    results.push(ScrapeResult {
                        device: device.name.clone(),
                        duration,
                        success: false,
                    });
                }
            }
        }
        results
    }
}

/// Everything one device task owns.
struct DeviceScrape {
    device: Arc<Device>,
    collectors: Arc<[Box<dyn Collector>]>,
    sessions: Arc<SessionManager>,
    sink: Arc<MetricSink>,
    meta: Arc<MetaMetrics>,
}

impl DeviceScrape {
    async fn run(self) -> ScrapeResult {
        let start = Instant::now();
        tracing::debug!(device = %self.device.name, "Starting scrape");

        let result = self.connect_and_collect().await;
        let duration = start.elapsed();

        let success = match result {
            Ok(()) => {
                tracing::debug!(
                    device = %self.device.name,
                    duration_ms = duration.as_millis(),
                    "Scrape succeeded"
                );
                true
            }
            Err(e) => {
                tracing::error!(device = %self.device.name, error = %e, "Scrape failed");
                if e.is_transport() {
                    self.sessions.invalidate(&self.device).await;
                }
                false
            }
        };

        self.meta
            .record(&self.sink, &self.device.name, duration, success);

        ScrapeResult {
            device: self.device.name.clone(),
            duration,
            success,
        }
    }

    async fn connect_and_collect(&self) -> Result<(), ScrapeError> {
        let session = self.sessions.connect(&self.device).await?;
        let ctx = CollectContext::new(&self.sink, &self.device, session.as_ref());

        for collector in self.collectors.iter() {
            collector
                .collect(&ctx)
                .await
                .map_err(|source| ScrapeError::Collector {
                    collector: collector.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}
