//! HTTP gateway setup.
//!
//! # Responsibilities
//! - Create the Axum router with the gateway handlers
//! - Wire up middleware (request id, telemetry, panic recovery, timeout)
//! - Bind the listener and serve until shutdown
//! - Forward `/random` to the random service through the RPC interceptor

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use axum::http::StatusCode;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

use crate::config::ServerConfig;
use crate::http::middleware::{track_request, TrackingState};
use crate::observability::{RequestContext, Telemetry};
use crate::random::{RandomClient, RandomServer};
use crate::rpc::UnaryInterceptor;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub random: Arc<RandomClient>,
}

impl AppState {
    /// Wire the in-process random service behind an instrumented interceptor.
    pub fn new(telemetry: &Telemetry, rpc_timeout: Duration) -> Self {
        let server = Arc::new(RandomServer::new(telemetry.tracer().clone()));
        let interceptor = UnaryInterceptor::new(telemetry.clone());
        Self {
            random: Arc::new(RandomClient::new(server, interceptor, rpc_timeout)),
        }
    }
}

/// HTTP gateway in front of the random service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, telemetry: Telemetry) -> Self {
        let state = AppState::new(&telemetry, Duration::from_millis(config.rpc_timeout_ms));
        let router = build_router(
            state,
            telemetry,
            Duration::from_secs(config.request_timeout_secs),
        );
        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down");
        })
        .await
    }
}

/// Build the gateway router with all middleware layers, outermost last.
#[allow(deprecated)]
pub fn build_router(state: AppState, telemetry: Telemetry, request_timeout: Duration) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/random", get(random_number))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(
            TrackingState::new(telemetry).with_request_timeout(request_timeout),
            track_request,
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn healthz() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    seed: Option<String>,
}

async fn random_number(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<RandomQuery>,
) -> Response {
    let seed = match query.seed.as_deref() {
        None | Some("") => return (StatusCode::BAD_REQUEST, "seed is required").into_response(),
        Some(raw) => match raw.parse::<i64>() {
            Ok(seed) => seed,
            Err(_) => return (StatusCode::BAD_REQUEST, "seed must be an integer").into_response(),
        },
    };

    match state.random.get_rand_number(&ctx, seed).await {
        Ok(number) => Json(serde_json::json!({ "number": number })).into_response(),
        Err(e) => e.into_response(),
    }
}
