//! Unary RPC server interceptor.

use std::error::Error;
use std::future::Future;
use std::time::Instant;

use crate::observability::metrics::descriptor::{
    GRPC_SERVER_HANDLED_TOTAL, GRPC_SERVER_HANDLING_SECONDS, GRPC_SERVER_INFLIGHT,
    GRPC_SERVER_MSG_RECEIVED_TOTAL, GRPC_SERVER_MSG_SENT_TOTAL, GRPC_SERVER_STARTED_TOTAL,
};
use crate::observability::{RequestContext, Telemetry, Tracer};

use super::status::{classify, StatusCode};

/// `grpc_type` label value for unary calls.
pub const UNARY: &str = "unary";

/// Call information handed to the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryServerInfo {
    /// `/package.Service/Method`
    pub full_method: String,
}

impl UnaryServerInfo {
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
        }
    }
}

/// Split `/package.Service/Method` into service and method.
///
/// Names without a separator yield `("unknown", "unknown")`.
pub fn split_method(full_method: &str) -> (&str, &str) {
    let name = full_method.strip_prefix('/').unwrap_or(full_method);
    match name.rfind('/') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => ("unknown", "unknown"),
    }
}

/// Wraps every unary call with a span, metrics and one log entry.
#[derive(Debug, Clone)]
pub struct UnaryInterceptor {
    telemetry: Telemetry,
}

impl UnaryInterceptor {
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Run `handler` under instrumentation and return its result untouched.
    ///
    /// The handler receives `ctx` with a child span attached; its deadline and
    /// metadata are passed through as given.
    pub async fn intercept<Req, Resp, E, H, Fut>(
        &self,
        ctx: RequestContext,
        info: &UnaryServerInfo,
        request: Req,
        handler: H,
    ) -> Result<Resp, E>
    where
        H: FnOnce(RequestContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
        E: Error + 'static,
    {
        let start = Instant::now();
        let telemetry = &self.telemetry;
        let (service, method) = split_method(&info.full_method);
        let call_labels = [UNARY, service, method];

        telemetry.count(GRPC_SERVER_STARTED_TOTAL, 1, &call_labels);
        let _in_flight = telemetry.in_flight(GRPC_SERVER_INFLIGHT, &[service, method]);
        telemetry.count(GRPC_SERVER_MSG_RECEIVED_TOTAL, 1, &call_labels);

        let tracer = telemetry.tracer();
        let span_ctx = tracer.start_span(&ctx, &info.full_method);

        let result = handler(span_ctx.clone(), request).await;

        let status = match &result {
            Ok(_) => StatusCode::Ok,
            Err(e) => classify(e),
        };
        let elapsed = start.elapsed().as_secs_f64();
        let handled_labels = [UNARY, service, method, status.as_str()];
        telemetry.count(GRPC_SERVER_HANDLED_TOTAL, 1, &handled_labels);
        telemetry.observe(GRPC_SERVER_HANDLING_SECONDS, elapsed, &handled_labels);
        if result.is_ok() {
            telemetry.count(GRPC_SERVER_MSG_SENT_TOTAL, 1, &call_labels);
        }

        let logger = telemetry
            .logger()
            .with_tracer(tracer.clone())
            .with(&span_ctx)
            .with_fields([
                ("method", serde_json::Value::from(info.full_method.as_str())),
                ("status", status.as_str().into()),
                ("duration_seconds", elapsed.into()),
                ("metadata", ctx.metadata_json()),
            ]);
        match &result {
            Ok(_) => logger.info("Success"),
            Err(e) => logger.error(e),
        }

        tracer.end_span(&span_ctx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_full_method() {
        assert_eq!(
            split_method("/random.v1.RandomService/GetRandNumber"),
            ("random.v1.RandomService", "GetRandNumber")
        );
        assert_eq!(split_method("Svc/Do"), ("Svc", "Do"));
        assert_eq!(split_method("garbage"), ("unknown", "unknown"));
    }
}
