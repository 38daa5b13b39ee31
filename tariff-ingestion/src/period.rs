//! Fetch-window selection.
//!
//! A window either spans an explicit year or trails the table's watermark by
//! a fixed lookback so late corrections from the source are re-fetched.

use std::fmt;

use energy_client::domain::{Cadence, RowKey, Table};
use time::{macros::date, Date, Duration, Month, Weekday};

use crate::pipeline::{PipelineError, Store};

/// Days subtracted from the watermark when computing the next window.
pub const LOOKBACK_DAYS: i64 = 60;

/// Days past today included in the window, for forward-dated rates.
pub const FORWARD_DAYS: i64 = 14;

/// Earliest date the source holds data for this account.
pub const EPOCH_START: Date = date!(2022 - 07 - 01);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub period_from: Date,
    pub period_to: Date,
}

impl Window {
    pub fn new(period_from: Date, period_to: Date) -> Result<Self, PipelineError> {
        if period_from > period_to {
            return Err(PipelineError::Window(format!("{period_from} is after {period_to}")));
        }
        Ok(Self { period_from, period_to })
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.period_from, self.period_to)
    }
}

/// Window covering one year. Weekly windows open on the Monday of ISO week 1,
/// which can fall in late December of the previous calendar year.
pub fn year_window(cadence: Cadence, year: i32) -> Result<Window, PipelineError> {
    let invalid = |e: time::error::ComponentRange| PipelineError::Window(format!("year {year}: {e}"));

    let period_from = match cadence {
        Cadence::Daily => Date::from_calendar_date(year, Month::January, 1).map_err(invalid)?,
        Cadence::Weekly => Date::from_iso_week_date(year, 1, Weekday::Monday).map_err(invalid)?,
    };
    let period_to = Date::from_calendar_date(year, Month::December, 31).map_err(invalid)?;

    Window::new(period_from, period_to)
}

/// Window trailing the watermark, or starting at the epoch for an empty table.
pub fn watermark_window(watermark: Option<Date>, today: Date) -> Window {
    let horizon = today.saturating_add(Duration::days(FORWARD_DAYS));

    match watermark {
        Some(mark) => Window {
            period_from: mark.saturating_sub(Duration::days(LOOKBACK_DAYS)),
            // Forward-dated rates can push the watermark past the horizon.
            period_to: horizon.max(mark),
        },
        None => Window {
            period_from: EPOCH_START,
            period_to: horizon.max(EPOCH_START),
        },
    }
}

/// Calendar date a watermark stands for. Weekly keys resolve to the Monday of
/// that week in the table's ISO year.
pub fn watermark_date(key: RowKey, table: &Table) -> Result<Date, PipelineError> {
    match key {
        RowKey::Date(d) => Ok(d),
        RowKey::Week(week) => {
            let year = table
                .year()
                .ok_or_else(|| PipelineError::Store(format!("{} has week keys but no year", table.name())))?;
            week.monday(year)
                .map_err(|e| PipelineError::Store(format!("{}: {e}", table.name())))
        }
    }
}

/// Window to request, and the watermark it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSelection {
    pub window: Window,
    pub watermark: Option<RowKey>,
}

pub struct PeriodSelector<'a, S: ?Sized> {
    store: &'a S,
    today: Date,
}

impl<'a, S> PeriodSelector<'a, S>
where
    S: Store + ?Sized,
{
    pub fn new(store: &'a S, today: Date) -> Self {
        Self { store, today }
    }

    /// Window to request for `table`. The watermark is read once and returned
    /// with the window. Store failures propagate; only an empty table falls
    /// back to the epoch.
    pub async fn select_window(&self, table: &Table, explicit_year: Option<i32>) -> Result<WindowSelection, PipelineError> {
        let watermark = self.store.latest_key(table).await?;

        let window = match (explicit_year, watermark) {
            (Some(year), _) => year_window(table.feed().cadence(), year)?,
            (None, Some(key)) => watermark_window(Some(watermark_date(key, table)?), self.today),
            (None, None) => {
                tracing::info!(table = table.name(), epoch = %EPOCH_START, "table is empty, starting from epoch");
                watermark_window(None, self.today)
            }
        };

        Ok(WindowSelection { window, watermark })
    }
}
