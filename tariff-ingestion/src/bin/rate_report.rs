use anyhow::{bail, Result};
use energy_client::{
    db::{consumption_queries, rate_queries},
    domain::{EnergyType, Table},
};
use sqlx::postgres::PgPoolOptions;
use tariff_ingestion::{
    config::{AppConfig, StoreKind},
    observability,
};

const RECENT_DAYS: i64 = 7;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    if cfg.store.kind != StoreKind::Postgres {
        bail!("rate_report reads from the postgres store; store.kind is {:?}", cfg.store.kind);
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.store.max_connections)
        .connect(&cfg.store.uri)
        .await?;

    for energy in EnergyType::ALL {
        match rate_queries::latest_rate_change(&pool, &Table::rates(energy)).await? {
            Some(change) => tracing::info!(
                energy = energy.as_str(),
                since = %change.date,
                latest = change.latest,
                previous = change.previous,
                delta = change.delta(),
                pct = ?change.percentage(),
                "unit rate change"
            ),
            None => tracing::info!(energy = energy.as_str(), "fewer than two rates stored"),
        }

        let total = consumption_queries::recent_total(&pool, &Table::daily_consumption(energy), RECENT_DAYS).await?;
        tracing::info!(energy = energy.as_str(), days = RECENT_DAYS, kwh = ?total, "recent consumption");
    }

    Ok(())
}
