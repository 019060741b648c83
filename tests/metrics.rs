// tests/metrics.rs
mod common;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::{test_config, Harness, StubSearch, WIRELESS_IDEA};
use novelty_assessor::error::ErrorKind;
use novelty_assessor::metrics::Metrics;
use novelty_assessor::pipeline::IdeaRequest;

// One recorder per process, so a single test covers the whole exposition.
#[tokio::test(start_paused = true)]
async fn metrics_endpoint_contains_expected_series() {
    let metrics = Metrics::init().expect("install recorder");

    let h = Harness::new(
        StubSearch::ok("patents-stub", common::patent_items(2)),
        StubSearch::failing("web-stub", ErrorKind::Unavailable),
    );
    let pipeline = h.pipeline(test_config());
    pipeline.run(IdeaRequest::new(WIRELESS_IDEA)).await.unwrap();
    pipeline.run(IdeaRequest::new(WIRELESS_IDEA)).await.unwrap();

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "pipeline_runs_total",
        "pipeline_degraded_total",
        "pipeline_duration_ms",
        "cache_hits_total",
        "cache_misses_total",
        "retry_attempts_total",
        "retry_exhausted_total",
    ] {
        assert!(text.contains(needle), "missing series {needle}\n{text}");
    }
    assert!(text.contains(r#"outcome="degraded""#));
}
