use anyhow::{bail, Context, Result};
use std::env;
use tariff_ingestion::{
    config::AppConfig,
    observability,
    pipeline::{Runner, WEEKLY_PASSES},
    sinks::StoreBackend,
    sources::ApiSource,
};
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_weekly <iso_year>");
    }
    let year: i32 = args[1]
        .parse()
        .with_context(|| format!("invalid year {:?}", args[1]))?;

    // Can point INGESTION_CONFIG at a backfill-specific file.
    let cfg = AppConfig::load()?;

    let source = ApiSource::new(&cfg.source)?;
    let store = StoreBackend::connect(&cfg.store).await?;
    let runner = Runner::from_config(source, store, &cfg);

    let summary = runner
        .run_passes(&WEEKLY_PASSES, OffsetDateTime::now_utc().date(), Some(year))
        .await;

    for report in &summary.reports {
        tracing::info!(table = %report.table, window = %report.window, written = report.written, "backfilled");
    }
    if summary.has_failures() {
        bail!("weekly backfill for {year} failed for {} table(s)", summary.failures.len());
    }

    Ok(())
}
