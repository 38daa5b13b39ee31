use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use energy_client::domain::{Row, RowKey, Table};
use tokio::sync::Mutex;

use super::{check_shape, collapse_duplicate_keys};
use crate::pipeline::{PipelineError, Store};

type Tables = HashMap<String, BTreeMap<RowKey, Row>>;

/// Process-local store with the same upsert semantics as the database. Used for
/// dry runs and tests. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a table in key order.
    pub async fn rows(&self, table: &Table) -> Vec<Row> {
        let tables = self.tables.lock().await;
        tables
            .get(table.name())
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn prepare(&self, table: &Table) -> Result<(), PipelineError> {
        self.tables.lock().await.entry(table.name().to_string()).or_default();
        Ok(())
    }

    async fn latest_key(&self, table: &Table) -> Result<Option<RowKey>, PipelineError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(table.name())
            .and_then(|t| t.last_key_value())
            .map(|(k, _)| *k))
    }

    async fn upsert(&self, table: &Table, rows: &[Row]) -> Result<u64, PipelineError> {
        check_shape(table, rows)?;
        let rows = collapse_duplicate_keys(rows);

        let mut tables = self.tables.lock().await;
        let stored = tables.entry(table.name().to_string()).or_default();
        for row in &rows {
            stored.insert(row.key(), row.clone());
        }
        Ok(rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::{ConsumptionRow, EnergyType, RateRow, WeeklyConsumptionRow};
    use time::macros::date;

    fn rate(date: time::Date, inc_vat: f64) -> Row {
        Row::Rate(RateRow {
            date,
            unit_rate_exc_vat: None,
            unit_rate_inc_vat: inc_vat,
        })
    }

    #[tokio::test]
    async fn empty_table_has_no_watermark() {
        let store = MemoryStore::new();
        let table = Table::rates(EnergyType::Electricity);

        store.prepare(&table).await.unwrap();

        assert_eq!(store.latest_key(&table).await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_overwrites_by_key() {
        let store = MemoryStore::new();
        let table = Table::rates(EnergyType::Electricity);

        store
            .upsert(&table, &[rate(date!(2024 - 01 - 01), 20.0), rate(date!(2024 - 01 - 02), 21.0)])
            .await
            .unwrap();
        let written = store.upsert(&table, &[rate(date!(2024 - 01 - 02), 22.5)]).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(
            store.rows(&table).await,
            vec![rate(date!(2024 - 01 - 01), 20.0), rate(date!(2024 - 01 - 02), 22.5)]
        );
        assert_eq!(
            store.latest_key(&table).await.unwrap(),
            Some(RowKey::Date(date!(2024 - 01 - 02)))
        );
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_batch_keep_the_last() {
        let store = MemoryStore::new();
        let table = Table::daily_consumption(EnergyType::Gas);
        let day = |kwh| {
            Row::Consumption(ConsumptionRow {
                date: date!(2024 - 02 - 01),
                consumption: kwh,
            })
        };

        let written = store.upsert(&table, &[day(1.0), day(2.0)]).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.rows(&table).await, vec![day(2.0)]);
    }

    #[tokio::test]
    async fn mismatched_rows_leave_table_untouched() {
        let store = MemoryStore::new();
        let table = Table::weekly_consumption(EnergyType::Gas, 2024);
        let week = Row::WeeklyConsumption(WeeklyConsumptionRow {
            week: "05".parse().unwrap(),
            date: date!(2024 - 01 - 29),
            consumption: 9.0,
        });

        let res = store.upsert(&table, &[week, rate(date!(2024 - 01 - 29), 1.0)]).await;

        assert!(res.is_err());
        assert!(store.rows(&table).await.is_empty());
    }

    #[tokio::test]
    async fn tables_are_kept_apart() {
        let store = MemoryStore::new();
        let elec = Table::rates(EnergyType::Electricity);
        let gas = Table::rates(EnergyType::Gas);

        store.upsert(&elec, &[rate(date!(2024 - 01 - 01), 20.0)]).await.unwrap();

        assert_eq!(store.latest_key(&gas).await.unwrap(), None);
        assert_eq!(store.clone().rows(&elec).await.len(), 1);
    }
}
