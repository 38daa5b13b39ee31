use anyhow::{bail, Result};
use sqlx::PgPool;

use crate::domain::{Feed, Table};

/// Total kWh over the most recent `days` stored days (not calendar days).
pub async fn recent_total(pool: &PgPool, table: &Table, days: i64) -> Result<Option<f64>> {
    if table.feed() != Feed::DailyConsumption {
        bail!("{} is not a daily consumption table", table.name());
    }

    let sql = format!(
        r#"
        SELECT SUM(consumption)
        FROM (
            SELECT consumption FROM {} ORDER BY date DESC LIMIT $1
        ) recent
        "#,
        table.name()
    );

    let total: Option<f64> = sqlx::query_scalar(&sql).bind(days).fetch_one(pool).await?;

    Ok(total)
}
