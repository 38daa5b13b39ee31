use energy_client::domain::{IsoWeek, Row, WeeklyConsumptionRow};
use time::{Date, Duration, Weekday};

use super::project_interval;
use crate::pipeline::{PipelineError, RawRecord};

/// Most recent weeks removed from a batch while still settling.
pub const TRAILING_WEEKS_DROPPED: usize = 1;

/// Days after a week's Sunday before its total is treated as final.
pub const SETTLING_DAYS: i64 = 7;

/// ISO year of the weekly table a scheduled pass fills. It trails today until
/// the last week of the previous year has settled, so that week is still
/// written to its own table after the new year starts. A week is settled from
/// its Monday plus `7 + SETTLING_DAYS` days.
pub fn table_year(today: Date) -> i32 {
    today
        .saturating_sub(Duration::days(7 + SETTLING_DAYS))
        .to_iso_week_date()
        .0
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyNormalizer {
    conversion_factor: f64,
    today: Date,
    iso_year: i32,
}

impl WeeklyNormalizer {
    pub fn new(conversion_factor: f64, today: Date, iso_year: i32) -> Self {
        Self {
            conversion_factor,
            today,
            iso_year,
        }
    }

    pub fn normalize(&self, raw: &[RawRecord]) -> Result<Vec<Row>, PipelineError> {
        let mut rows = Vec::with_capacity(raw.len());
        for (i, rec) in raw.iter().enumerate() {
            let interval = project_interval(rec, i, self.conversion_factor)?;
            let year = interval.date.to_iso_week_date().0;
            if year != self.iso_year {
                tracing::debug!(date = %interval.date, year, table_year = self.iso_year, "interval outside table year");
                continue;
            }
            rows.push(WeeklyConsumptionRow {
                week: IsoWeek::of(interval.date),
                date: interval.date,
                consumption: interval.consumption,
            });
        }
        rows.sort_by_key(|r| (r.week, r.date));

        for _ in 0..TRAILING_WEEKS_DROPPED {
            let Some(last) = rows.last().map(|r| r.week) else {
                break;
            };
            if self.is_settled(last) {
                break;
            }
            tracing::debug!(week = %last, "dropping week still within settling period");
            rows.retain(|r| r.week != last);
        }

        Ok(rows.into_iter().map(Row::WeeklyConsumption).collect())
    }

    /// A week is settled once its Sunday is more than `SETTLING_DAYS` behind today.
    fn is_settled(&self, week: IsoWeek) -> bool {
        match Date::from_iso_week_date(self.iso_year, week.number(), Weekday::Sunday) {
            Ok(sunday) => sunday.saturating_add(Duration::days(SETTLING_DAYS)) < self.today,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::records;
    use serde_json::json;
    use time::macros::date;

    fn weeks(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r.key().to_string()).collect()
    }

    #[test]
    fn labels_are_zero_padded_iso_weeks() {
        let raw = records(json!([
            {"interval_start": "2024-01-08T00:00:00Z", "consumption": 50.0},
            {"interval_start": "2024-01-01T00:00:00Z", "consumption": 40.0},
        ]));

        let rows = WeeklyNormalizer::new(1.0, date!(2024 - 06 - 01), 2024).normalize(&raw).unwrap();

        assert_eq!(weeks(&rows), vec!["01", "02"]);
        assert!(matches!(&rows[0], Row::WeeklyConsumption(w) if w.date == date!(2024 - 01 - 01) && w.consumption == 40.0));
    }

    #[test]
    fn gas_weeks_are_converted() {
        let raw = records(json!([{"interval_start": "2024-01-01T00:00:00Z", "consumption": 10.0}]));

        let rows = WeeklyNormalizer::new(11.2, date!(2024 - 06 - 01), 2024).normalize(&raw).unwrap();
        assert!(matches!(&rows[0], Row::WeeklyConsumption(w) if w.consumption == 112.0));
    }

    #[test]
    fn unsettled_trailing_week_is_dropped() {
        let raw = records(json!([
            {"interval_start": "2024-03-04T00:00:00Z", "consumption": 1.0},
            {"interval_start": "2024-03-11T00:00:00Z", "consumption": 2.0},
        ]));

        // Week 11 ends Sunday 2024-03-17; seven days later is 2024-03-24.
        let at_boundary = WeeklyNormalizer::new(1.0, date!(2024 - 03 - 24), 2024).normalize(&raw).unwrap();
        assert_eq!(weeks(&at_boundary), vec!["10"]);

        let settled = WeeklyNormalizer::new(1.0, date!(2024 - 03 - 25), 2024).normalize(&raw).unwrap();
        assert_eq!(weeks(&settled), vec!["10", "11"]);
    }

    #[test]
    fn only_one_trailing_week_is_dropped() {
        let raw = records(json!([
            {"interval_start": "2024-03-04T00:00:00Z", "consumption": 1.0},
            {"interval_start": "2024-03-11T00:00:00Z", "consumption": 2.0},
            {"interval_start": "2024-03-18T00:00:00Z", "consumption": 3.0},
        ]));

        let rows = WeeklyNormalizer::new(1.0, date!(2024 - 03 - 19), 2024).normalize(&raw).unwrap();
        assert_eq!(weeks(&rows), vec!["10", "11"]);
    }

    #[test]
    fn intervals_from_other_iso_years_are_discarded() {
        let raw = records(json!([
            {"interval_start": "2024-12-23T00:00:00Z", "consumption": 1.0},
            {"interval_start": "2024-12-30T00:00:00Z", "consumption": 2.0},
        ]));

        // 2024-12-30 is week 01 of ISO year 2025.
        let rows = WeeklyNormalizer::new(1.0, date!(2025 - 03 - 01), 2024).normalize(&raw).unwrap();
        assert_eq!(weeks(&rows), vec!["52"]);

        let next_year = WeeklyNormalizer::new(1.0, date!(2025 - 03 - 01), 2025).normalize(&raw).unwrap();
        assert_eq!(weeks(&next_year), vec!["01"]);
    }

    #[test]
    fn table_year_trails_until_last_week_settles() {
        // 2025 ends with week 52 (Sunday 2025-12-28); week 01 of 2026 starts 2025-12-29.
        assert_eq!(table_year(date!(2025 - 12 - 31)), 2025);
        assert_eq!(table_year(date!(2026 - 01 - 05)), 2025);
        assert_eq!(table_year(date!(2026 - 01 - 11)), 2025);
        assert_eq!(table_year(date!(2026 - 01 - 12)), 2026);
        assert_eq!(table_year(date!(2024 - 06 - 01)), 2024);
    }

    #[test]
    fn last_week_of_year_settles_before_table_year_moves_on() {
        let raw = records(json!([
            {"interval_start": "2025-12-22T00:00:00Z", "consumption": 5.0},
            {"interval_start": "2025-12-29T00:00:00Z", "consumption": 6.0},
        ]));

        let today = date!(2026 - 01 - 05);
        let rows = WeeklyNormalizer::new(1.0, today, table_year(today)).normalize(&raw).unwrap();
        assert_eq!(weeks(&rows), vec!["52"]);
    }

    #[test]
    fn malformed_weekly_record_is_rejected() {
        let raw = records(json!([{"interval_start": "2024-01-01T00:00:00Z", "consumption": null}]));

        let err = WeeklyNormalizer::new(1.0, date!(2024 - 06 - 01), 2024).normalize(&raw).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { index: 0, .. }));
    }
}
