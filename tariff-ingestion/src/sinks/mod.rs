pub mod memory;
pub mod postgres;

use std::{collections::BTreeMap, time::Duration};

use energy_client::domain::{Feed, Row, RowKey, Table};
use sqlx::postgres::PgPoolOptions;

use crate::{
    config::{StoreConfig, StoreKind},
    pipeline::{PipelineError, Store},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Every row must have the shape of the table it is written to.
pub(crate) fn check_shape(table: &Table, rows: &[Row]) -> Result<(), PipelineError> {
    let fits = |row: &Row| {
        matches!(
            (table.feed(), row),
            (Feed::Rates, Row::Rate(_))
                | (Feed::DailyConsumption, Row::Consumption(_))
                | (Feed::WeeklyConsumption, Row::WeeklyConsumption(_))
        )
    };
    match rows.iter().position(|r| !fits(r)) {
        Some(i) => Err(PipelineError::Store(format!(
            "row #{i} ({:?}) does not fit table {}",
            rows[i].key(),
            table.name()
        ))),
        None => Ok(()),
    }
}

/// One row per key, the last occurrence winning, in key order.
pub(crate) fn collapse_duplicate_keys(rows: &[Row]) -> Vec<Row> {
    let mut by_key: BTreeMap<RowKey, Row> = BTreeMap::new();
    for row in rows {
        by_key.insert(row.key(), row.clone());
    }
    by_key.into_values().collect()
}

/// Store selected by `store.kind`.
pub enum StoreBackend {
    Postgres(PgStore),
    Memory(MemoryStore),
}

impl StoreBackend {
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, PipelineError> {
        match cfg.kind {
            StoreKind::Memory => {
                tracing::info!("using in-memory store; nothing will be persisted");
                Ok(Self::Memory(MemoryStore::new()))
            }
            StoreKind::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect(&cfg.uri)
                    .await
                    .map_err(|e| PipelineError::Store(format!("failed to connect: {e}")))?;
                Ok(Self::Postgres(PgStore::new(
                    pool,
                    cfg.batch_size,
                    cfg.max_retries,
                    Duration::from_millis(cfg.retry_backoff_ms),
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl Store for StoreBackend {
    async fn prepare(&self, table: &Table) -> Result<(), PipelineError> {
        match self {
            Self::Postgres(s) => s.prepare(table).await,
            Self::Memory(s) => s.prepare(table).await,
        }
    }

    async fn latest_key(&self, table: &Table) -> Result<Option<RowKey>, PipelineError> {
        match self {
            Self::Postgres(s) => s.latest_key(table).await,
            Self::Memory(s) => s.latest_key(table).await,
        }
    }

    async fn upsert(&self, table: &Table, rows: &[Row]) -> Result<u64, PipelineError> {
        match self {
            Self::Postgres(s) => s.upsert(table, rows).await,
            Self::Memory(s) => s.upsert(table, rows).await,
        }
    }
}
