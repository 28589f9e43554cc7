//! Prometheus exporter.

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder and describes every Lumen metric.
///
/// Returns the handle used to render the scrape output. Calling it again
/// returns the already installed handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Some(handle.clone());
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        warn!("Failed to set global metrics recorder (already set)");
        return None;
    }
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    lumen_jobs::register_metrics();
    info!("Prometheus metrics initialized");
    Some(handle)
}

/// Router serving the scrape endpoint at `path`.
pub fn router(path: &str, handle: PrometheusHandle) -> Router {
    Router::new()
        .route(path, get(render))
        .with_state(handle)
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
