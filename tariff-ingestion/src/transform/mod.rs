//! Raw source records to typed rows.
//!
//! Normalization is all-or-nothing: a single malformed record fails the batch,
//! since skipping it could leave a gap below the next watermark.

pub mod daily;
pub mod incremental;
pub mod weekly;

use energy_client::domain::{Feed, Row};
use chrono::Datelike;
use chrono_tz::Tz;
use serde_json::Value;
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    macros::format_description,
    Date, OffsetDateTime, PrimitiveDateTime,
};

use crate::{
    config::EnergyParams,
    pipeline::{Envelope, PipelineError, RawRecord, Transform},
};

pub use daily::DailyNormalizer;
pub use incremental::select_new;
pub use weekly::{table_year, WeeklyNormalizer, SETTLING_DAYS, TRAILING_WEEKS_DROPPED};

/// Normalizer for one feed, selected by its cadence.
#[derive(Debug, Clone)]
pub enum Normalizer {
    Daily(DailyNormalizer),
    Weekly(WeeklyNormalizer),
}

impl Normalizer {
    /// `today` decides whether the trailing week is complete; `iso_year` is the
    /// year of the weekly table being filled.
    pub fn for_feed(feed: Feed, params: &EnergyParams, today: Date, iso_year: i32) -> Self {
        match feed {
            Feed::Rates => Self::Daily(DailyNormalizer::rates()),
            Feed::DailyConsumption => Self::Daily(DailyNormalizer::consumption(params.conversion_factor)),
            Feed::WeeklyConsumption => Self::Weekly(WeeklyNormalizer::new(params.conversion_factor, today, iso_year)),
        }
    }

    pub fn feed(&self) -> Feed {
        match self {
            Self::Daily(d) => d.feed(),
            Self::Weekly(_) => Feed::WeeklyConsumption,
        }
    }

    pub fn normalize(&self, raw: &[RawRecord]) -> Result<Vec<Row>, PipelineError> {
        match self {
            Self::Daily(d) => d.normalize(raw),
            Self::Weekly(w) => w.normalize(raw),
        }
    }
}

impl Transform for Normalizer {
    fn apply(&self, input: Envelope<Vec<RawRecord>>) -> Result<Envelope<Vec<Row>>, PipelineError> {
        match self.normalize(&input.payload) {
            Ok(rows) => Ok(input.map(|_| rows)),
            Err(e) => {
                metrics::counter!("normalize_rejected_batches_total", "feed" => self.feed().as_str()).increment(1);
                Err(e)
            }
        }
    }
}

/// A consumption interval projected onto its calendar date, already in kWh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Interval {
    pub date: Date,
    pub consumption: f64,
}

/// Shared raw-to-row projection for consumption feeds. The conversion factor
/// is applied here and nowhere else.
pub(crate) fn project_interval(
    record: &RawRecord,
    index: usize,
    conversion_factor: f64,
) -> Result<Interval, PipelineError> {
    Ok(Interval {
        date: date_field(record, "interval_start", index)?,
        consumption: number_field(record, "consumption", index)? * conversion_factor,
    })
}

fn malformed(index: usize, reason: impl Into<String>) -> PipelineError {
    PipelineError::MalformedRecord {
        index,
        reason: reason.into(),
    }
}

/// Zone tariff periods are announced in. Rate changes start at local midnight
/// but are reported in UTC.
pub const TARIFF_TIMEZONE: Tz = chrono_tz::Europe::London;

fn string_field<'r>(record: &'r RawRecord, field: &str, index: usize) -> Result<&'r str, PipelineError> {
    match record.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(malformed(index, format!("{field} is not a string: {other}"))),
        None => Err(malformed(index, format!("missing {field}"))),
    }
}

/// Calendar date of a timestamp field, in the offset the source reported it in.
pub(crate) fn date_field(record: &RawRecord, field: &str, index: usize) -> Result<Date, PipelineError> {
    let raw = string_field(record, field, index)?;
    parse_calendar_date(raw).ok_or_else(|| malformed(index, format!("{field} is not a timestamp: {raw:?}")))
}

/// Calendar date of a timestamp field as seen on a wall clock in `tz`.
pub(crate) fn local_date_field(record: &RawRecord, field: &str, index: usize, tz: Tz) -> Result<Date, PipelineError> {
    let raw = string_field(record, field, index)?;
    parse_instant(raw)
        .and_then(|instant| local_date(instant, tz))
        .ok_or_else(|| malformed(index, format!("{field} is not a timestamp: {raw:?}")))
}

pub(crate) fn number_field(record: &RawRecord, field: &str, index: usize) -> Result<f64, PipelineError> {
    match optional_number_field(record, field, index)? {
        Some(v) => Ok(v),
        None => Err(malformed(index, format!("missing {field}"))),
    }
}

/// Absent and `null` both read as `None`; any other non-number is an error.
pub(crate) fn optional_number_field(
    record: &RawRecord,
    field: &str,
    index: usize,
) -> Result<Option<f64>, PipelineError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| malformed(index, format!("{field} is not a finite number"))),
        Some(other) => Err(malformed(index, format!("{field} is not a number: {other}"))),
    }
}

/// Date part of an ISO-8601 timestamp such as `2024-01-01T00:00:00+01:00` or
/// `2024-01-01T00:00Z`. The time of day only needs to be present, not exact.
fn parse_calendar_date(raw: &str) -> Option<Date> {
    let trimmed = raw.trim();
    let (day, time_of_day) = trimmed.split_once('T').unwrap_or((trimmed, ""));
    if !time_of_day.is_empty() && !time_of_day.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

/// Full timestamp with offset. Seconds may be omitted, as in `2024-01-01T00:00Z`.
fn parse_instant(raw: &str) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    OffsetDateTime::parse(trimmed, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(trimmed, &Iso8601::DEFAULT))
        .or_else(|_| {
            PrimitiveDateTime::parse(trimmed, format_description!("[year]-[month]-[day]T[hour]:[minute]Z"))
                .map(PrimitiveDateTime::assume_utc)
        })
        .ok()
}

fn local_date(instant: OffsetDateTime, tz: Tz) -> Option<Date> {
    let utc = chrono::DateTime::<chrono::Utc>::from_timestamp(instant.unix_timestamp(), 0)?;
    let local = utc.with_timezone(&tz).date_naive();
    Date::from_ordinal_date(local.year(), u16::try_from(local.ordinal()).ok()?).ok()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::RawRecord;
    use serde_json::Value;

    pub fn records(value: Value) -> Vec<RawRecord> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => map,
                    other => panic!("expected object, got {other}"),
                })
                .collect(),
            other => panic!("expected array, got {other}"),
        }
    }
}
