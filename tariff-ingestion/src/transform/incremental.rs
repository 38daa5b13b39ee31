use energy_client::domain::{Row, RowKey};

/// Rows whose key is strictly greater than the watermark, in input order.
/// With no watermark every row is new.
pub fn select_new(rows: Vec<Row>, watermark: Option<RowKey>) -> Vec<Row> {
    let Some(mark) = watermark else {
        return rows;
    };

    let before = rows.len();
    let fresh: Vec<Row> = rows.into_iter().filter(|r| r.key() > mark).collect();
    let skipped = before - fresh.len();
    if skipped > 0 {
        metrics::counter!("incremental_rows_skipped_total").increment(skipped as u64);
        tracing::debug!(%mark, skipped, kept = fresh.len(), "filtered rows at or below watermark");
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::{ConsumptionRow, RateRow, WeeklyConsumptionRow};
    use time::macros::date;

    fn rate(date: time::Date, inc_vat: f64) -> Row {
        Row::Rate(RateRow {
            date,
            unit_rate_exc_vat: None,
            unit_rate_inc_vat: inc_vat,
        })
    }

    #[test]
    fn keeps_rows_after_the_watermark() {
        let rows = vec![rate(date!(2024 - 01 - 01), 20.0), rate(date!(2024 - 01 - 02), 21.0)];

        let fresh = select_new(rows, Some(RowKey::Date(date!(2024 - 01 - 01))));

        assert_eq!(fresh, vec![rate(date!(2024 - 01 - 02), 21.0)]);
    }

    #[test]
    fn no_watermark_keeps_everything() {
        let rows = vec![rate(date!(2024 - 01 - 01), 20.0), rate(date!(2024 - 01 - 02), 21.0)];
        assert_eq!(select_new(rows.clone(), None), rows);
    }

    #[test]
    fn nothing_newer_yields_empty() {
        let rows = vec![Row::Consumption(ConsumptionRow {
            date: date!(2024 - 01 - 01),
            consumption: 1.0,
        })];
        assert!(select_new(rows, Some(RowKey::Date(date!(2024 - 02 - 01)))).is_empty());
    }

    #[test]
    fn week_labels_compare_numerically() {
        let row = |week: &str| {
            Row::WeeklyConsumption(WeeklyConsumptionRow {
                week: week.parse().unwrap(),
                date: date!(2024 - 01 - 01),
                consumption: 1.0,
            })
        };
        let rows = vec![row("09"), row("10"), row("11")];

        let fresh = select_new(rows, Some(RowKey::Week("10".parse().unwrap())));

        assert_eq!(fresh, vec![row("11")]);
    }
}
