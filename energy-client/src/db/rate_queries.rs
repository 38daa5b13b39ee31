use anyhow::{bail, Result};
use sqlx::PgPool;
use time::Date;

use crate::domain::{Feed, RateRow, Table};

/// Movement between the two most recent unit rates of a tariff.
#[derive(Debug, Clone, PartialEq)]
pub struct RateChange {
    pub date: Date,
    pub latest: f64,
    pub previous: f64,
}

impl RateChange {
    pub fn delta(&self) -> f64 {
        self.latest - self.previous
    }

    /// Percentage change relative to the previous rate; `None` when the
    /// previous rate is zero.
    pub fn percentage(&self) -> Option<f64> {
        if self.previous == 0.0 {
            None
        } else {
            Some(self.delta() / self.previous * 100.0)
        }
    }
}

/// Derive the change from rows ordered newest first.
pub fn rate_change(newest_first: &[RateRow]) -> Option<RateChange> {
    match newest_first {
        [latest, previous, ..] => Some(RateChange {
            date: latest.date,
            latest: latest.unit_rate_inc_vat,
            previous: previous.unit_rate_inc_vat,
        }),
        _ => None,
    }
}

/// Most recent `limit` rates of a rates table, newest first.
pub async fn latest_rates(pool: &PgPool, table: &Table, limit: i64) -> Result<Vec<RateRow>> {
    if table.feed() != Feed::Rates {
        bail!("{} is not a rates table", table.name());
    }

    let sql = format!(
        "SELECT date, unit_rate_exc_vat, unit_rate_inc_vat FROM {} ORDER BY date DESC LIMIT $1",
        table.name()
    );

    let rows = sqlx::query_as::<_, RateRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn latest_rate_change(pool: &PgPool, table: &Table) -> Result<Option<RateChange>> {
    let rows = latest_rates(pool, table, 2).await?;
    Ok(rate_change(&rows))
}
