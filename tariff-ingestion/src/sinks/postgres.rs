use std::time::Duration;

use energy_client::domain::{Feed, IsoWeek, Row, RowKey, Table};
use sqlx::{postgres::PgPool, Postgres, QueryBuilder, Transaction};
use time::Date;

use super::{check_shape, collapse_duplicate_keys};
use crate::pipeline::{PipelineError, Store};

pub struct PgStore {
    pool: PgPool,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    /// Writes every chunk inside one transaction; nothing is visible until commit.
    async fn write_all(&self, table: &Table, rows: &[Row]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(self.batch_size) {
            insert_chunk(&mut tx, table, chunk).await?;
        }
        tx.commit().await
    }
}

fn create_table_sql(table: &Table) -> String {
    let columns = match table.feed() {
        Feed::Rates => {
            "date DATE PRIMARY KEY, \
             unit_rate_exc_vat DOUBLE PRECISION, \
             unit_rate_inc_vat DOUBLE PRECISION NOT NULL"
        }
        Feed::DailyConsumption => "date DATE PRIMARY KEY, consumption DOUBLE PRECISION NOT NULL",
        Feed::WeeklyConsumption => {
            "week TEXT PRIMARY KEY, date DATE NOT NULL, consumption DOUBLE PRECISION NOT NULL"
        }
    };
    format!("CREATE TABLE IF NOT EXISTS {} ({columns})", table.name())
}

fn insert_prefix(table: &Table) -> String {
    let columns = match table.feed() {
        Feed::Rates => "date, unit_rate_exc_vat, unit_rate_inc_vat",
        Feed::DailyConsumption => "date, consumption",
        Feed::WeeklyConsumption => "week, date, consumption",
    };
    format!("INSERT INTO {} ({columns}) ", table.name())
}

fn conflict_clause(table: &Table) -> String {
    let updates = match table.feed() {
        Feed::Rates => {
            "unit_rate_exc_vat = EXCLUDED.unit_rate_exc_vat, unit_rate_inc_vat = EXCLUDED.unit_rate_inc_vat"
        }
        Feed::DailyConsumption => "consumption = EXCLUDED.consumption",
        Feed::WeeklyConsumption => "date = EXCLUDED.date, consumption = EXCLUDED.consumption",
    };
    format!(" ON CONFLICT ({}) DO UPDATE SET {updates}", table.key_column())
}

fn latest_key_sql(table: &Table) -> String {
    let key = table.key_column();
    format!("SELECT {key} FROM {} ORDER BY {key} DESC LIMIT 1", table.name())
}

async fn insert_chunk(
    tx: &mut Transaction<'_, Postgres>,
    table: &Table,
    chunk: &[Row],
) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(insert_prefix(table));

    // Shapes are checked before writing, so each arm only sees its own variant.
    match table.feed() {
        Feed::Rates => {
            let rates = chunk.iter().filter_map(|r| match r {
                Row::Rate(rate) => Some(rate),
                _ => None,
            });
            builder.push_values(rates, |mut b, r| {
                b.push_bind(r.date)
                    .push_bind(r.unit_rate_exc_vat)
                    .push_bind(r.unit_rate_inc_vat);
            });
        }
        Feed::DailyConsumption => {
            let days = chunk.iter().filter_map(|r| match r {
                Row::Consumption(c) => Some(c),
                _ => None,
            });
            builder.push_values(days, |mut b, c| {
                b.push_bind(c.date).push_bind(c.consumption);
            });
        }
        Feed::WeeklyConsumption => {
            let weeks = chunk.iter().filter_map(|r| match r {
                Row::WeeklyConsumption(w) => Some(w),
                _ => None,
            });
            builder.push_values(weeks, |mut b, w| {
                b.push_bind(w.week.to_string())
                    .push_bind(w.date)
                    .push_bind(w.consumption);
            });
        }
    }
    builder.push(conflict_clause(table));

    builder.build().execute(&mut **tx).await.map(|_| ())
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn prepare(&self, table: &Table) -> Result<(), PipelineError> {
        sqlx::query(&create_table_sql(table))
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(format!("failed to create {}: {e}", table.name())))?;
        Ok(())
    }

    async fn latest_key(&self, table: &Table) -> Result<Option<RowKey>, PipelineError> {
        let sql = latest_key_sql(table);
        let read_err = |e: sqlx::Error| PipelineError::Store(format!("failed to read watermark of {}: {e}", table.name()));

        match table.feed() {
            Feed::Rates | Feed::DailyConsumption => {
                let latest: Option<Date> = sqlx::query_scalar(&sql)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(read_err)?;
                Ok(latest.map(RowKey::Date))
            }
            Feed::WeeklyConsumption => {
                let latest: Option<String> = sqlx::query_scalar(&sql)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(read_err)?;
                latest
                    .map(|label| {
                        label
                            .parse::<IsoWeek>()
                            .map(RowKey::Week)
                            .map_err(|e| PipelineError::Store(format!("{}: {e}", table.name())))
                    })
                    .transpose()
            }
        }
    }

    async fn upsert(&self, table: &Table, rows: &[Row]) -> Result<u64, PipelineError> {
        check_shape(table, rows)?;
        let rows = collapse_duplicate_keys(rows);
        if rows.is_empty() {
            return Ok(0);
        }

        let energy = table.energy().as_str();
        let feed = table.feed().as_str();
        let mut attempt: u32 = 0;
        loop {
            match self.write_all(table, &rows).await {
                Ok(()) => {
                    metrics::counter!("store_upserted_rows_total", "energy" => energy, "feed" => feed)
                        .increment(rows.len() as u64);
                    return Ok(rows.len() as u64);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    metrics::counter!("store_retries_total", "energy" => energy, "feed" => feed).increment(1);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        table = table.name(),
                        "upsert failed, retrying with backoff"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, table = table.name(), "upsert failed, giving up");
                    metrics::counter!("store_errors_total", "energy" => energy, "feed" => feed).increment(1);
                    return Err(PipelineError::Store(e.to_string()));
                }
            }
        }
    }
}
