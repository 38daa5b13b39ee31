use std::time::Duration;

use energy_client::domain::Feed;
use reqwest::{Client, Url};
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, Date};

use crate::{
    config::SourceConfig,
    pipeline::{Envelope, FetchRequest, PipelineError, RawRecord, Source},
};

/// Largest page the source serves for unit rates.
pub const RATES_PAGE_SIZE: u32 = 1_500;

/// Largest page the source serves for consumption.
pub const CONSUMPTION_PAGE_SIZE: u32 = 25_000;

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    next: Option<String>,
    results: Vec<RawRecord>,
}

/// Metering API client. Requests a single page per call; a response that
/// reports further pages is logged and counted rather than followed.
pub struct ApiSource {
    client: Client,
    base_url: String,
    product_code: String,
    api_key: Option<String>,
}

impl ApiSource {
    pub fn new(cfg: &SourceConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::SourceUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            product_code: cfg.product_code.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    pub fn endpoint(&self, request: &FetchRequest<'_>) -> Result<Url, PipelineError> {
        let params = request.params;
        let fuel = params.energy.as_str();
        let period_from = format_bound(request.window.period_from)?;
        let period_to = format_bound(request.window.period_to)?;

        let (path, mut query) = match request.feed {
            Feed::Rates => (
                format!(
                    "{}/products/{}/{fuel}-tariffs/{}/standard-unit-rates/",
                    self.base_url, self.product_code, params.tariff_code
                ),
                vec![("page_size", RATES_PAGE_SIZE.to_string())],
            ),
            Feed::DailyConsumption | Feed::WeeklyConsumption => {
                let group_by = if request.feed == Feed::WeeklyConsumption { "week" } else { "day" };
                (
                    format!(
                        "{}/{fuel}-meter-points/{}/meters/{}/consumption/",
                        self.base_url, params.meter_point, params.serial_number
                    ),
                    vec![
                        ("group_by", group_by.to_string()),
                        ("page_size", CONSUMPTION_PAGE_SIZE.to_string()),
                    ],
                )
            }
        };
        query.push(("period_from", period_from));
        query.push(("period_to", period_to));

        Url::parse_with_params(&path, &query)
            .map_err(|e| PipelineError::SourceUnavailable(format!("invalid endpoint {path}: {e}")))
    }
}

/// Window bounds go out as UTC midnights, e.g. `2024-01-01T00:00:00Z`.
fn format_bound(date: Date) -> Result<String, PipelineError> {
    date.midnight()
        .assume_utc()
        .format(&Rfc3339)
        .map_err(|e| PipelineError::Window(format!("cannot format {date}: {e}")))
}

#[async_trait::async_trait]
impl Source for ApiSource {
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Envelope<Vec<RawRecord>>, PipelineError> {
        let energy = request.params.energy.as_str();
        let feed = request.feed.as_str();
        let url = self.endpoint(request)?;

        let mut req = self.client.get(url);
        if request.feed.is_consumption() {
            let key = self
                .api_key
                .as_deref()
                .ok_or_else(|| PipelineError::SourceUnavailable("consumption endpoints need an API key".to_string()))?;
            req = req.basic_auth(key, Some(""));
        }

        metrics::counter!("source_requests_total", "energy" => energy, "feed" => feed).increment(1);

        let resp = req.send().await.map_err(|e| {
            metrics::counter!("source_errors_total", "energy" => energy, "feed" => feed).increment(1);
            PipelineError::SourceUnavailable(format!("{energy} {feed} request failed: {e}"))
        })?;

        let status = resp.status();
        if !status.is_success() {
            metrics::counter!("source_errors_total", "energy" => energy, "feed" => feed).increment(1);
            return Err(PipelineError::SourceUnavailable(format!(
                "{energy} {feed} request failed with status {status}"
            )));
        }

        let page: Page = resp.json().await.map_err(|e| {
            metrics::counter!("source_errors_total", "energy" => energy, "feed" => feed).increment(1);
            PipelineError::SourceUnavailable(format!("failed to parse {energy} {feed} response: {e}"))
        })?;

        if page.next.is_some() {
            metrics::counter!("source_truncated_pages_total", "energy" => energy, "feed" => feed).increment(1);
            tracing::warn!(
                energy,
                feed,
                returned = page.results.len(),
                total = ?page.count,
                window = %request.window,
                "source has more than one page for this window; only the first page is ingested"
            );
        }

        tracing::debug!(energy, feed, records = page.results.len(), "fetched page");

        Ok(Envelope::new(page.results))
    }
}
