//! Seeded random number service.
//!
//! Three layers, each opening its own span: the RPC handler
//! ([`RandomServer`]), the usecase ([`RandomService`]) and the repository
//! ([`RandomRepository`]). [`RandomClient`] is the caller side used by the
//! gateway; it invokes the handler through the [`UnaryInterceptor`].

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::observability::context::{CLIENT_IP_KEY, REQUEST_ID_KEY};
use crate::observability::{RequestContext, Tracer, TracerBackend};
use crate::rpc::{ServiceError, UnaryInterceptor, UnaryServerInfo};

/// Full method name of the only RPC.
pub const GET_RAND_NUMBER: &str = "/random.v1.RandomService/GetRandNumber";

/// Smallest accepted seed.
pub const MIN_SEED: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRandNumberRequest {
    pub seed_num: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRandNumberReply {
    pub number: i64,
}

#[derive(Debug, Clone)]
pub struct RandomRepository {
    tracer: Arc<TracerBackend>,
}

impl RandomRepository {
    pub fn new(tracer: Arc<TracerBackend>) -> Self {
        Self { tracer }
    }

    /// Non-negative number drawn from a generator seeded with `seed`.
    pub fn get(&self, ctx: &RequestContext, seed: i64) -> Result<i64, ServiceError> {
        let ctx = self.tracer.start_span(ctx, "RandomService.Repository.GetRandNumber");
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let number = rng.gen_range(0..=i64::MAX);
        self.tracer.end_span(&ctx);
        Ok(number)
    }
}

#[derive(Debug, Clone)]
pub struct RandomService {
    repo: RandomRepository,
    tracer: Arc<TracerBackend>,
}

impl RandomService {
    pub fn new(repo: RandomRepository, tracer: Arc<TracerBackend>) -> Self {
        Self { repo, tracer }
    }

    pub fn get(&self, ctx: &RequestContext, seed: i64) -> Result<i64, ServiceError> {
        let ctx = self.tracer.start_span(ctx, "RandomService.Usecase.GetRandNumber");
        let result = if seed < MIN_SEED {
            Err(ServiceError::InvalidArgument(format!(
                "seed must be greater than {MIN_SEED}"
            )))
        } else {
            self.repo.get(&ctx, seed)
        };
        self.tracer.end_span(&ctx);
        result
    }
}

/// RPC handler side.
#[derive(Debug, Clone)]
pub struct RandomServer {
    service: RandomService,
    tracer: Arc<TracerBackend>,
}

impl RandomServer {
    pub fn new(tracer: Arc<TracerBackend>) -> Self {
        let repo = RandomRepository::new(tracer.clone());
        Self {
            service: RandomService::new(repo, tracer.clone()),
            tracer,
        }
    }

    /// Handle one call, honoring the deadline carried by `ctx`.
    pub async fn get_rand_number(
        &self,
        ctx: RequestContext,
        request: GetRandNumberRequest,
    ) -> Result<GetRandNumberReply, ServiceError> {
        let ctx = self.tracer.start_span(&ctx, "RandomService.Handler.GetRandNumber");
        let work = async { self.service.get(&ctx, request.seed_num) };
        let result = match ctx.remaining() {
            Some(left) if left.is_zero() => Err(ServiceError::DeadlineExceeded),
            Some(left) => tokio::time::timeout(left, work).await.unwrap_or_else(|e| Err(e.into())),
            None => work.await,
        };
        self.tracer.end_span(&ctx);
        result.map(|number| GetRandNumberReply { number })
    }
}

/// Caller side of the random service.
#[derive(Debug, Clone)]
pub struct RandomClient {
    server: Arc<RandomServer>,
    interceptor: UnaryInterceptor,
    timeout: Duration,
}

impl RandomClient {
    pub fn new(server: Arc<RandomServer>, interceptor: UnaryInterceptor, timeout: Duration) -> Self {
        Self {
            server,
            interceptor,
            timeout,
        }
    }

    /// Request a number for `seed`.
    ///
    /// The request id and client address in `ctx` travel as call metadata.
    /// The configured timeout becomes the call deadline, unless `ctx`
    /// already carries an earlier one; the handler enforces it.
    pub async fn get_rand_number(&self, ctx: &RequestContext, seed: i64) -> Result<i64, ServiceError> {
        let outgoing = outgoing_context(ctx).with_timeout(self.timeout);
        let server = self.server.clone();
        let info = UnaryServerInfo::new(GET_RAND_NUMBER);

        let reply = self
            .interceptor
            .intercept(
                outgoing,
                &info,
                GetRandNumberRequest { seed_num: seed },
                move |ctx, request| async move { server.get_rand_number(ctx, request).await },
            )
            .await?;
        Ok(reply.number)
    }
}

/// Call metadata for the outgoing request: only the correlation keys.
fn outgoing_context(ctx: &RequestContext) -> RequestContext {
    let mut outgoing = RequestContext::new().with_otel_context(ctx.otel_context().clone());
    for key in [REQUEST_ID_KEY, CLIENT_IP_KEY] {
        if let Some(value) = ctx.metadata_value(key).filter(|v| !v.is_empty()) {
            outgoing = outgoing.with_metadata(key, value);
        }
    }
    match ctx.deadline() {
        Some(deadline) => outgoing.with_deadline(deadline),
        None => outgoing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::tracer::{OtlpTracer, TracerConfig};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn disabled() -> Arc<TracerBackend> {
        Arc::new(TracerBackend::fallback())
    }

    #[test]
    fn small_seed_is_invalid() {
        let service = RandomService::new(RandomRepository::new(disabled()), disabled());
        let err = service.get(&RequestContext::new(), 1).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert_eq!(err.to_string(), "validate: seed must be greater than 2");
    }

    #[test]
    fn same_seed_same_number() {
        let service = RandomService::new(RandomRepository::new(disabled()), disabled());
        let ctx = RequestContext::new();
        let a = service.get(&ctx, 42).unwrap();
        let b = service.get(&ctx, 42).unwrap();
        assert_eq!(a, b);
        assert!(a >= 0);
        assert_ne!(a, service.get(&ctx, 43).unwrap());
    }

    #[tokio::test]
    async fn handler_opens_nested_spans() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = Arc::new(TracerBackend::Otlp(OtlpTracer::with_provider(
            TracerConfig {
                service_name: "random".to_string(),
                enabled: true,
                ..Default::default()
            },
            provider,
        )));

        let server = RandomServer::new(tracer);
        server
            .get_rand_number(RequestContext::new(), GetRandNumberRequest { seed_num: 7 })
            .await
            .unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        let names: Vec<_> = spans.iter().map(|s| s.name.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "RandomService.Repository.GetRandNumber",
                "RandomService.Usecase.GetRandNumber",
                "RandomService.Handler.GetRandNumber",
            ]
        );
        let trace_id = spans[0].span_context.trace_id();
        assert!(spans.iter().all(|s| s.span_context.trace_id() == trace_id));
    }

    #[tokio::test]
    async fn expired_deadline_is_rejected() {
        let server = RandomServer::new(disabled());
        let ctx = RequestContext::new().with_deadline(std::time::Instant::now());
        let err = server
            .get_rand_number(ctx, GetRandNumberRequest { seed_num: 7 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn live_deadline_lets_the_call_through() {
        let server = RandomServer::new(disabled());
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(5));
        let reply = server
            .get_rand_number(ctx, GetRandNumberRequest { seed_num: 7 })
            .await
            .unwrap();
        assert!(reply.number >= 0);
    }

    #[test]
    fn outgoing_context_forwards_ids() {
        let ctx = RequestContext::new()
            .with_metadata(REQUEST_ID_KEY, "req-9")
            .with_metadata(CLIENT_IP_KEY, "10.0.0.7")
            .with_metadata("authorization", "secret");
        let out = outgoing_context(&ctx);
        assert_eq!(out.request_id(), Some("req-9"));
        assert_eq!(out.metadata_value(CLIENT_IP_KEY), Some("10.0.0.7"));
        assert_eq!(out.metadata_value("authorization"), None);
    }
}
