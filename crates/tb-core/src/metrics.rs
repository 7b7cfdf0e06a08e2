use axum::extract::MatchedPath;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};

pub const SERVICE_NAME: &str = "tb-api";
pub const RESULT_OK: &str = "ok";
pub const RESULT_ERROR: &str = "error";

const HTTP_LABELS: &[&str] = &["service", "route", "method", "status"];
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

struct TributeMetrics {
    registry: Registry,
    up: IntGaugeVec,
    http_requests: IntCounterVec,
    http_latency: HistogramVec,
    mutations: IntCounterVec,
    blob_delete_failures: IntCounterVec,
    feed_snapshots: IntCounterVec,
    live_subscribers: IntGaugeVec,
}

static METRICS: OnceLock<TributeMetrics> = OnceLock::new();

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let metric = IntCounterVec::new(Opts::new(name, help), labels).expect("counter definition");
    registry
        .register(Box::new(metric.clone()))
        .expect("counter registration");
    metric
}

fn gauge(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntGaugeVec {
    let metric = IntGaugeVec::new(Opts::new(name, help), labels).expect("gauge definition");
    registry
        .register(Box::new(metric.clone()))
        .expect("gauge registration");
    metric
}

fn metrics() -> &'static TributeMetrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let http_latency = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            HTTP_LABELS,
        )
        .expect("histogram definition");
        registry
            .register(Box::new(http_latency.clone()))
            .expect("histogram registration");

        TributeMetrics {
            up: gauge(&registry, "tb_up", "Service health", &["service"]),
            http_requests: counter(
                &registry,
                "http_requests_total",
                "HTTP request count",
                HTTP_LABELS,
            ),
            http_latency,
            mutations: counter(
                &registry,
                "tribute_mutations_total",
                "Tribute mutations by outcome",
                &["op", "result"],
            ),
            blob_delete_failures: counter(
                &registry,
                "tribute_blob_delete_failures_total",
                "Photo deletions that were skipped or failed",
                &["reason"],
            ),
            feed_snapshots: counter(
                &registry,
                "tribute_feed_snapshots_total",
                "Snapshots published by the live feed",
                &["source"],
            ),
            live_subscribers: gauge(
                &registry,
                "tribute_live_subscribers",
                "Active live feed subscribers",
                &["kind"],
            ),
            registry,
        }
    })
}

pub fn init(service_name: &'static str) {
    metrics().up.with_label_values(&[service_name]).set(1);
}

pub fn record_http_request(
    service_name: &'static str,
    method: &str,
    route: &str,
    status: u16,
    duration: Duration,
) {
    let status = status.to_string();
    let labels = [service_name, route, method, status.as_str()];
    let metrics = metrics();
    metrics.http_requests.with_label_values(&labels).inc();
    metrics
        .http_latency
        .with_label_values(&labels)
        .observe(duration.as_secs_f64());
}

/// `op` is one of `create`, `update`, `delete`.
pub fn inc_mutation(op: &'static str, ok: bool) {
    let result = if ok { RESULT_OK } else { RESULT_ERROR };
    metrics().mutations.with_label_values(&[op, result]).inc();
}

pub fn inc_blob_delete_failure(reason: &'static str) {
    metrics()
        .blob_delete_failures
        .with_label_values(&[reason])
        .inc();
}

pub fn inc_feed_snapshot(source: &'static str) {
    metrics().feed_snapshots.with_label_values(&[source]).inc();
}

pub fn inc_live_subscribers(kind: &'static str) {
    metrics().live_subscribers.with_label_values(&[kind]).inc();
}

pub fn dec_live_subscribers(kind: &'static str) {
    metrics().live_subscribers.with_label_values(&[kind]).dec();
}

/// Prometheus text exposition of every tribute-board metric.
pub fn metrics_response(service_name: &'static str) -> Response {
    init(service_name);
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&metrics().registry.gather(), &mut buffer) {
        tracing::error!(error = %err, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(EXPOSITION_CONTENT_TYPE),
        )],
        buffer,
    )
        .into_response()
}

/// Records count and latency per matched route.
#[derive(Clone)]
pub struct MetricsLayer {
    service_name: &'static str,
}

impl MetricsLayer {
    pub fn new(service_name: &'static str) -> Self {
        Self { service_name }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            service_name: self.service_name,
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    service_name: &'static str,
}

// `/api/:id` stays a single series instead of one per tribute.
fn route_label<B>(request: &Request<B>) -> String {
    match request.extensions().get::<MatchedPath>() {
        Some(path) => path.as_str().to_string(),
        None => request.uri().path().to_string(),
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let service_name = self.service_name;
        let method = request.method().to_string();
        let route = route_label(&request);
        let started = Instant::now();
        let pending = self.inner.call(request);
        Box::pin(async move {
            let result = pending.await;
            let status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            };
            record_http_request(service_name, &method, &route, status, started.elapsed());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn exposition_has_prometheus_content_type() {
        let response = metrics_response("tb-test");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            EXPOSITION_CONTENT_TYPE
        );
    }

    #[test]
    fn tribute_counters_are_registered() {
        inc_mutation("create", true);
        inc_blob_delete_failure("malformed_url");
        let gathered = metrics().registry.gather();
        let names: Vec<&str> = gathered.iter().map(|family| family.get_name()).collect();
        assert!(names.contains(&"tribute_mutations_total"));
        assert!(names.contains(&"tribute_blob_delete_failures_total"));
    }

    #[tokio::test]
    async fn layer_labels_requests_with_the_route_template() {
        let router = Router::new()
            .route("/api/:id", get(|| async { "ok" }))
            .layer(MetricsLayer::new("tb-layer-test"));

        let response = router
            .oneshot(Request::builder().uri("/api/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let count = metrics()
            .http_requests
            .with_label_values(&["tb-layer-test", "/api/:id", "GET", "200"])
            .get();
        assert_eq!(count, 1);
    }
}
