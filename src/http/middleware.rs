//! HTTP telemetry middleware.
//!
//! Runs inside the request-id layers so every request already carries an
//! `x-request-id` header when it arrives here.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::observability::context::CLIENT_IP_KEY;
use crate::observability::metrics::descriptor::{
    HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUEST_INFLIGHT, HTTP_REQUEST_SIZE_BYTES,
    HTTP_REQUEST_TOTAL, HTTP_RESPONSE_SIZE_BYTES,
};
use crate::observability::{RequestContext, Telemetry, Tracer};

/// Route label used when no route matched.
pub const UNKNOWN_ROUTE: &str = "unknown";

/// State for [`track_request`].
#[derive(Debug, Clone)]
pub struct TrackingState {
    telemetry: Telemetry,
    request_timeout: Option<Duration>,
}

impl TrackingState {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            telemetry,
            request_timeout: None,
        }
    }

    /// Stamp every request context with a deadline `timeout` from arrival.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl From<Telemetry> for TrackingState {
    fn from(telemetry: Telemetry) -> Self {
        Self::new(telemetry)
    }
}

/// Instrument one request: span, in-flight gauge, size and latency metrics,
/// and one log entry. The response is returned untouched.
///
/// Handlers find the request's [`RequestContext`] in the request extensions,
/// carrying the request deadline when a timeout is configured.
pub async fn track_request(
    State(TrackingState {
        telemetry,
        request_timeout,
    }): State<TrackingState>,
    mut req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_ROUTE.to_string());
    let method = req.method().clone();
    let uri = req.uri().to_string();

    let _in_flight = telemetry.in_flight(HTTP_REQUEST_INFLIGHT, &[&route]);
    telemetry.observe(
        HTTP_REQUEST_SIZE_BYTES,
        approximate_request_size(&req) as f64,
        &[&route],
    );

    let mut ctx = RequestContext::from_headers(req.headers().clone());
    if let Some(timeout) = request_timeout {
        ctx = ctx.with_timeout(timeout);
    }
    if ctx.metadata_value(CLIENT_IP_KEY).is_none() {
        if let Some(ip) = client_ip(&req) {
            ctx = ctx.with_metadata(CLIENT_IP_KEY, &ip);
        }
    }
    let tracer = telemetry.tracer();
    let ctx = tracer.start_span(&ctx, &format!("{method} {route}"));
    req.extensions_mut().insert(ctx.clone());

    let response = next.run(req).await;

    let status = response.status();
    let status_label = status.as_u16().to_string();
    let elapsed = start.elapsed().as_secs_f64();

    telemetry.count(HTTP_REQUEST_TOTAL, 1, &[&route, &status_label]);
    telemetry.observe(HTTP_REQUEST_DURATION_SECONDS, elapsed, &[&route, &status_label]);
    telemetry.observe(
        HTTP_RESPONSE_SIZE_BYTES,
        response_size(&response) as f64,
        &[&route],
    );

    let logger = telemetry
        .logger()
        .with_tracer(tracer.clone())
        .with(&ctx)
        .with_fields([
            ("method", Value::from(method.as_str())),
            ("uri", uri.into()),
            ("route", route.as_str().into()),
            ("status", status.as_u16().into()),
            ("duration_seconds", elapsed.into()),
        ]);
    if status.is_client_error() || status.is_server_error() {
        logger.error("request failed");
    } else {
        logger.info("received request");
    }

    tracer.end_span(&ctx);
    response
}

/// Approximate wire size: request line, headers and declared body length.
fn approximate_request_size(req: &Request) -> usize {
    let mut size = req.uri().path().len();
    size += req.method().as_str().len();
    size += format!("{:?}", req.version()).len();
    for (name, value) in req.headers() {
        size += name.as_str().len() + value.len();
    }
    if let Some(host) = req.uri().host() {
        size += host.len();
    }
    size += req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    size
}

fn response_size(response: &Response<Body>) -> u64 {
    let hint = response.body().size_hint();
    hint.exact().unwrap_or_else(|| hint.lower())
}

/// Client address: first `x-forwarded-for` hop, `x-real-ip`, then the peer.
fn client_ip(req: &Request) -> Option<String> {
    let headers = req.headers();
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real.is_empty() {
            return Some(real.to_string());
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_size_counts_line_and_headers() {
        let req = Request::builder()
            .method("GET")
            .uri("/random?seed=5")
            .header("x-request-id", "abc")
            .body(Body::empty())
            .unwrap();
        // "/random" + "GET" + "HTTP/1.1" + "x-request-id" + "abc"
        assert_eq!(approximate_request_size(&req), 7 + 3 + 8 + 12 + 3);
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req).as_deref(), Some("203.0.113.9"));

        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let peer: SocketAddr = "192.0.2.4:40000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(client_ip(&req).as_deref(), Some("192.0.2.4"));
    }
}
