use std::time::SystemTime;

use energy_client::domain::{EnergyType, Feed, Row, RowKey, Table};
use time::Date;
use tracing::{field, Instrument, Span};

use super::{FetchRequest, PipelineError, Source, Store, Transform};
use crate::{
    config::EnergyParams,
    period::{PeriodSelector, Window},
    transform::{select_new, table_year, Normalizer},
};

/// One (energy, feed) combination to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSpec {
    pub energy: EnergyType,
    pub feed: Feed,
}

impl PassSpec {
    pub const fn new(energy: EnergyType, feed: Feed) -> Self {
        Self { energy, feed }
    }
}

impl std::fmt::Display for PassSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.energy, self.feed)
    }
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub spec: PassSpec,
    pub table: String,
    pub window: Window,
    pub fetched: usize,
    pub normalized: usize,
    pub written: u64,
    pub watermark_before: Option<RowKey>,
    pub watermark_after: Option<RowKey>,
}

/// Select window, fetch, normalize, filter and upsert for one table.
pub struct IngestionPass<'a, S: ?Sized, K: ?Sized> {
    source: &'a S,
    store: &'a K,
    params: &'a EnergyParams,
    today: Date,
}

impl<'a, S, K> IngestionPass<'a, S, K>
where
    S: Source + ?Sized,
    K: Store + ?Sized,
{
    pub fn new(source: &'a S, store: &'a K, params: &'a EnergyParams, today: Date) -> Self {
        Self {
            source,
            store,
            params,
            today,
        }
    }

    /// `explicit_year` pins the window to one year. Weekly passes without it
    /// fill the table chosen by `table_year`, which keeps the previous year's
    /// table open until its last week has settled.
    pub async fn run(&self, feed: Feed, explicit_year: Option<i32>) -> Result<PassReport, PipelineError> {
        let span = tracing::info_span!(
            "ingest_pass",
            energy = self.params.energy.as_str(),
            feed = feed.as_str(),
            window = field::Empty,
        );
        self.execute(feed, explicit_year, span.clone()).instrument(span).await
    }

    async fn execute(&self, feed: Feed, explicit_year: Option<i32>, span: Span) -> Result<PassReport, PipelineError> {
        let iso_year = explicit_year.unwrap_or_else(|| table_year(self.today));
        let table = Table::for_feed(self.params.energy, feed, iso_year);

        self.store.prepare(&table).await?;

        let selection = PeriodSelector::new(self.store, self.today)
            .select_window(&table, explicit_year)
            .await?;
        let (window, watermark_before) = (selection.window, selection.watermark);
        span.record("window", field::display(window));

        let raw = self
            .source
            .fetch(&FetchRequest {
                params: self.params,
                feed,
                window,
            })
            .await?;
        let fetched = raw.payload.len();

        let normalizer = Normalizer::for_feed(feed, self.params, self.today, iso_year);
        let batch = normalizer.apply(raw)?;
        let normalized = batch.payload.len();
        let received_at = batch.received_at;

        let fresh = select_new(batch.payload, watermark_before);
        let newest = fresh.iter().map(Row::key).max();

        let written = if fresh.is_empty() {
            tracing::info!(table = table.name(), "no rows past the watermark");
            0
        } else {
            self.store.upsert(&table, &fresh).await?
        };
        // Every fresh key is above the watermark, so the newest one is the new watermark.
        let watermark_after = newest.or(watermark_before);

        if let Ok(dur) = SystemTime::now().duration_since(received_at) {
            metrics::histogram!("ingest_end_to_end_latency_seconds", "feed" => feed.as_str()).record(dur.as_secs_f64());
        }

        tracing::info!(
            table = table.name(),
            fetched,
            normalized,
            written,
            watermark = ?watermark_after.map(|k| k.to_string()),
            "pass complete"
        );

        Ok(PassReport {
            spec: PassSpec::new(self.params.energy, feed),
            table: table.name().to_string(),
            window,
            fetched,
            normalized,
            written,
            watermark_before,
            watermark_after,
        })
    }
}
