use anyhow::{bail, Result};
use std::time::Duration;
use tariff_ingestion::{
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Runner,
    sinks::StoreBackend,
    sources::ApiSource,
};
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(metrics_cfg).await?;
    }

    let source = ApiSource::new(&cfg.source)?;
    let store = StoreBackend::connect(&cfg.store).await?;
    let runner = Runner::from_config(source, store, &cfg);

    let Some(interval_secs) = cfg.schedule.interval_secs else {
        let summary = runner.run_once(OffsetDateTime::now_utc().date()).await;
        if summary.has_failures() {
            bail!("{} of the ingestion passes failed", summary.failures.len());
        }
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(interval_secs, "running on a schedule");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are already logged and counted per pass; the next tick retries.
                runner.run_once(OffsetDateTime::now_utc().date()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}
