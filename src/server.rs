//! Web server module for the exporter.
//!
//! Serves the pull endpoint, a liveness probe and a landing page. Every pull
//! of the metrics path runs one scrape pass; overlapping pulls are serialized.

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::metrics::MetricSink;
use crate::scrape::ScrapeOrchestrator;

/// Default metrics path.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Shared application state.
pub struct AppState {
    orchestrator: Arc<ScrapeOrchestrator>,
    registry: Registry,
    metrics_path: String,
    scrape_lock: Mutex<()>,
}

impl AppState {
    /// Create state serving `orchestrator` at `metrics_path`.
    ///
    /// # Errors
    /// Returns an error if the static exporter metrics cannot be registered.
    pub fn new(
        orchestrator: Arc<ScrapeOrchestrator>,
        metrics_path: impl Into<String>,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            orchestrator,
            registry: exporter_registry()?,
            metrics_path: metrics_path.into(),
            scrape_lock: Mutex::new(()),
        })
    }
}

/// Registry with metrics describing the exporter itself.
fn exporter_registry() -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    let build_info = IntGaugeVec::new(
        Opts::new(
            "mikrotik_exporter_build_info",
            "A metric with a constant '1' value labeled by version",
        ),
        &["version"],
    )?;
    build_info
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1);
    registry.register(Box::new(build_info))?;
    Ok(registry)
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.clone();
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route(&metrics_path, get(metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(app_state)
}

/// Landing page.
async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Mikrotik Exporter</title></head>\n\
         <body>\n\
         <h1>Mikrotik Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        path = state.metrics_path
    ))
}

/// Liveness probe, independent of device health.
async fn healthz_handler() -> &'static str {
    "ok"
}

/// Run one scrape pass and render everything gathered.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let _pass = state.scrape_lock.lock().await;

    let sink = Arc::new(MetricSink::new());
    let results = state.orchestrator.collect(Arc::clone(&sink)).await;
    let failed = results.iter().filter(|r| !r.success).count();
    tracing::debug!(devices = results.len(), failed, "Scrape pass finished");

    let mut families = state.registry.gather();
    families.extend(sink.gather());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
