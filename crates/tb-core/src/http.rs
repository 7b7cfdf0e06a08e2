use axum::http::header::HeaderName;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

use crate::metrics::MetricsLayer;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Upper bound for any request body, photo uploads included.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps the router with request ids, tracing, a timeout, the body limit and
/// metrics. Each `.layer` wraps the previous ones, so the request id is set
/// before anything logs it.
pub fn apply_standard_layers(router: Router, service_name: &'static str) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let trace = TraceLayer::new_for_http()
        .make_span_with(move |request: &Request<_>| {
            let id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http.request",
                service = service_name,
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %id
            )
        })
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    router
        .layer(MetricsLayer::new(service_name))
        .layer(trace)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let router = apply_standard_layers(
            Router::new().route("/healthz", get(|| async { StatusCode::OK })),
            "tb-test",
        );

        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().get(REQUEST_ID_HEADER).is_some());
    }

    #[tokio::test]
    async fn incoming_request_id_is_echoed() {
        let router = apply_standard_layers(
            Router::new().route("/healthz", get(|| async { StatusCode::OK })),
            "tb-test",
        );

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-42");
    }

    #[tokio::test]
    async fn oversized_uploads_are_rejected() {
        let router = apply_standard_layers(
            Router::new().route(
                "/api/tributes/upload",
                post(|body: axum::body::Bytes| async move { body.len().to_string() }),
            ),
            "tb-test",
        );

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tributes/upload")
                    .header("content-length", (MAX_BODY_BYTES + 1).to_string())
                    .body(Body::from(vec![b'a'; MAX_BODY_BYTES + 1]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn chained_layers_label_metrics_by_route() {
        let router = apply_standard_layers(
            Router::new().route("/api/:id", get(|| async { StatusCode::OK })),
            "tb-stack-test",
        );

        let response = router
            .oneshot(Request::builder().uri("/api/t-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let exposition = crate::metrics::metrics_response("tb-stack-test");
        let body = axum::body::to_bytes(exposition.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("route=\"/api/:id\""));
        assert!(text.contains("service=\"tb-stack-test\""));
    }
}
