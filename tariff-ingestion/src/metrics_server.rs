//! Prometheus exposition for the ingestion service.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{extract::State, routing::get, Router};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Fetch-to-write latency buckets, in seconds.
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Registers help text for every metric the passes emit.
pub fn describe() {
    describe_counter!("source_requests_total", "Requests sent to the metering API.");
    describe_counter!("source_errors_total", "Failed or unparseable metering API responses.");
    describe_counter!(
        "source_truncated_pages_total",
        "Responses that reported further pages which were not fetched."
    );
    describe_counter!("normalize_rejected_batches_total", "Batches rejected for a malformed record.");
    describe_counter!("incremental_rows_skipped_total", "Rows at or below the table watermark.");
    describe_counter!("store_upserted_rows_total", "Rows inserted or updated.");
    describe_counter!("store_retries_total", "Upsert attempts retried after an error.");
    describe_counter!("store_errors_total", "Upserts abandoned after the last retry.");
    describe_counter!("ingest_pass_failed_total", "Passes that ended in an error.");
    describe_histogram!(
        "ingest_end_to_end_latency_seconds",
        Unit::Seconds,
        "Time from receiving a page to finishing its pass."
    );
}

/// `/metrics` renders `handle`; `/healthz` answers `ok`.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(handle)
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Installs the global recorder and serves `router` on the configured
/// address for the lifetime of the process. Bind errors fail startup.
pub async fn init(cfg: &MetricsConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = cfg
        .bind_addr
        .parse()
        .with_context(|| format!("invalid metrics bind address {}", cfg.bind_addr))?;

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("ingest_end_to_end_latency_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .context("invalid latency buckets")?
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;
    describe();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    tracing::info!(%addr, "metrics endpoint listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(handle).into_make_service()).await {
            tracing::error!(error = %e, "metrics server error");
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app.into_make_service()).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_recorded_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            describe();
            metrics::counter!("source_truncated_pages_total", "energy" => "gas", "feed" => "rates").increment(2);
        });

        let base = serve(router(handle)).await;
        let body = reqwest::get(format!("{base}/metrics")).await.unwrap().text().await.unwrap();

        assert!(body.contains("# HELP source_truncated_pages_total"), "{body}");
        let line = body.lines().find(|l| l.starts_with("source_truncated_pages_total{"));
        assert!(line.is_some_and(|l| l.ends_with(" 2")), "{body}");
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let base = serve(router(PrometheusBuilder::new().build_recorder().handle())).await;

        let resp = reqwest::get(format!("{base}/healthz")).await.unwrap();

        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn unparseable_bind_address_is_rejected() {
        let cfg = MetricsConfig {
            bind_addr: "not-an-address".to_string(),
        };
        assert!(init(&cfg).await.is_err());
    }
}
