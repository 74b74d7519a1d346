use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — render the recorder's current snapshot for scraping.
///
/// Carries its own state (the recorder handle) rather than `AppState`, so
/// the route is wired separately in `main`.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
