// src/metrics.rs
use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// Register descriptions for every metric the crate emits. Idempotent.
pub fn describe() {
    static DESCRIBED: OnceCell<()> = OnceCell::new();
    DESCRIBED.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline runs by outcome");
        describe_counter!(
            "pipeline_degraded_total",
            "Runs that continued with one evidence source missing"
        );
        describe_histogram!(
            "pipeline_duration_ms",
            Unit::Milliseconds,
            "Wall time of a pipeline run"
        );
        describe_counter!("cache_hits_total", "Cache hits by provider");
        describe_counter!("cache_misses_total", "Cache misses by provider");
        describe_counter!("retry_attempts_total", "Attempts made by retry policies, by service");
        describe_counter!(
            "retry_exhausted_total",
            "Retry policies that used every attempt, by service"
        );
        describe_counter!(
            "keyword_fallback_total",
            "Runs that fell back to the static keyword list"
        );
    });
}
