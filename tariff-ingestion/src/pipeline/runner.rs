use std::time::Duration;

use energy_client::domain::{EnergyType, Feed};
use time::Date;

use super::{IngestionPass, PassReport, PassSpec, PipelineError, Source, Store};
use crate::config::{AppConfig, EnergyParams};

/// Every table, in the order a scheduled run visits them.
pub const CANONICAL_PASSES: [PassSpec; 6] = [
    PassSpec::new(EnergyType::Electricity, Feed::Rates),
    PassSpec::new(EnergyType::Gas, Feed::Rates),
    PassSpec::new(EnergyType::Electricity, Feed::DailyConsumption),
    PassSpec::new(EnergyType::Gas, Feed::DailyConsumption),
    PassSpec::new(EnergyType::Electricity, Feed::WeeklyConsumption),
    PassSpec::new(EnergyType::Gas, Feed::WeeklyConsumption),
];

pub const WEEKLY_PASSES: [PassSpec; 2] = [
    PassSpec::new(EnergyType::Electricity, Feed::WeeklyConsumption),
    PassSpec::new(EnergyType::Gas, Feed::WeeklyConsumption),
];

#[derive(Debug)]
pub struct PassFailure {
    pub spec: PassSpec,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<PassReport>,
    pub failures: Vec<PassFailure>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn rows_written(&self) -> u64 {
        self.reports.iter().map(|r| r.written).sum()
    }
}

/// Runs passes one after another against a shared source and store.
pub struct Runner<S, K> {
    source: S,
    store: K,
    electricity: EnergyParams,
    gas: EnergyParams,
    pacing: Duration,
}

impl<S, K> Runner<S, K>
where
    S: Source,
    K: Store,
{
    pub fn new(source: S, store: K, electricity: EnergyParams, gas: EnergyParams, pacing: Duration) -> Self {
        Self {
            source,
            store,
            electricity,
            gas,
            pacing,
        }
    }

    pub fn from_config(source: S, store: K, cfg: &AppConfig) -> Self {
        Self::new(
            source,
            store,
            cfg.energy_params(EnergyType::Electricity),
            cfg.energy_params(EnergyType::Gas),
            cfg.pacing(),
        )
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn params(&self, energy: EnergyType) -> &EnergyParams {
        match energy {
            EnergyType::Electricity => &self.electricity,
            EnergyType::Gas => &self.gas,
        }
    }

    pub async fn run_once(&self, today: Date) -> RunSummary {
        self.run_passes(&CANONICAL_PASSES, today, None).await
    }

    /// A failing pass is logged and recorded; the remaining passes still run.
    pub async fn run_passes(&self, passes: &[PassSpec], today: Date, explicit_year: Option<i32>) -> RunSummary {
        let mut summary = RunSummary::default();

        for (i, spec) in passes.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let pass = IngestionPass::new(&self.source, &self.store, self.params(spec.energy), today);
            match pass.run(spec.feed, explicit_year).await {
                Ok(report) => summary.reports.push(report),
                Err(error) => {
                    metrics::counter!(
                        "ingest_pass_failed_total",
                        "energy" => spec.energy.as_str(),
                        "feed" => spec.feed.as_str()
                    )
                    .increment(1);
                    tracing::error!(pass = %spec, error = %error, "pass failed");
                    summary.failures.push(PassFailure { spec: *spec, error });
                }
            }
        }

        tracing::info!(
            passes = passes.len(),
            failed = summary.failures.len(),
            written = summary.rows_written(),
            "run finished"
        );
        summary
    }
}
