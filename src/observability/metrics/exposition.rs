//! Metrics exposition endpoint.
//!
//! # Responsibilities
//! - Serve `GET /metrics` as Prometheus text exposition
//! - Serve `GET /healthz` as a liveness check
//! - Run histogram upkeep in the background while serving
//!
//! # Design Decisions
//! - Runs as its own listener, never on the request path
//! - Bind/serve failures are logged and end the task; the process keeps running

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use super::{MetricsBackend, MetricsSink};
use crate::observability::logging::Logger;
use crate::observability::TelemetryError;

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Router exposing `/metrics` and `/healthz` for `metrics`.
pub fn exposition_router(metrics: Arc<MetricsBackend>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/healthz", get(healthz))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Arc<MetricsBackend>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}

async fn healthz() -> &'static str {
    "OK"
}

/// Serve the exposition endpoint on an already-bound listener until `shutdown` fires.
pub async fn serve_exposition(
    metrics: Arc<MetricsBackend>,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), TelemetryError> {
    let upkeep = {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
            loop {
                interval.tick().await;
                metrics.run_upkeep();
            }
        })
    };

    let result = axum::serve(listener, exposition_router(metrics))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await;

    upkeep.abort();
    result.map_err(TelemetryError::from)
}

/// Bind `address` and serve until shutdown, reporting any failure to `logger`.
///
/// Never returns an error: a broken metrics listener must not take the
/// service down with it.
pub async fn run_exposition_server(
    metrics: Arc<MetricsBackend>,
    logger: Logger,
    address: String,
    shutdown: broadcast::Receiver<()>,
) {
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            logger.error(format_args!("Error starting metrics server on {address}: {e}"));
            return;
        }
    };
    tracing::info!(address = %address, "Metrics exposition listening");

    if let Err(e) = serve_exposition(metrics, listener, shutdown).await {
        logger.error(format_args!("Metrics server stopped: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::PrometheusMetrics;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_returns_ok() {
        let router = exposition_router(Arc::new(MetricsBackend::fallback()));
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn metrics_renders_registry() {
        let metrics = PrometheusMetrics::new(&crate::observability::metrics::descriptor::http_metrics()).unwrap();
        metrics.counter_add("request_total", 1, &["/a", "200"]).unwrap();
        let router = exposition_router(Arc::new(MetricsBackend::Prometheus(metrics)));

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("http_request_total{"));
        assert!(text.contains("build_info{"));
    }

    #[tokio::test]
    async fn bind_failure_is_logged_not_fatal() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = occupied.local_addr().unwrap().to_string();
        let (logger, logs) = Logger::capture(&Default::default());
        let (_tx, rx) = broadcast::channel(1);

        run_exposition_server(Arc::new(MetricsBackend::fallback()), logger, address, rx).await;

        let entries = logs.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["level"], "error");
        assert!(entries[0]["msg"].as_str().unwrap().starts_with("Error starting metrics server"));
    }
}
