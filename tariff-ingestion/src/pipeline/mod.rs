pub mod pass;
pub mod runner;

use std::time::SystemTime;

use energy_client::domain::{Feed, Row, RowKey, Table};

use crate::{config::EnergyParams, period::Window};

pub use pass::{IngestionPass, PassReport, PassSpec};
pub use runner::{PassFailure, RunSummary, Runner, CANONICAL_PASSES, WEEKLY_PASSES};

/// One reading object from the source's `results` array, untouched.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            payload: f(self.payload),
            received_at: self.received_at,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("malformed record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid window: {0}")]
    Window(String),
}

/// What a source is asked for on one pass.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub params: &'a EnergyParams,
    pub feed: Feed,
    pub window: Window,
}

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    /// One bounded request; the raw result list comes back unmodified.
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Envelope<Vec<RawRecord>>, PipelineError>;
}

pub trait Transform: Send + Sync {
    fn apply(&self, input: Envelope<Vec<RawRecord>>) -> Result<Envelope<Vec<Row>>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Create the table if it does not exist yet.
    async fn prepare(&self, _table: &Table) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Largest key in the table; `Ok(None)` for an empty table.
    async fn latest_key(&self, table: &Table) -> Result<Option<RowKey>, PipelineError>;

    /// Insert-or-update by key, last write wins. Either every row becomes
    /// visible or none does. Returns the number of rows written.
    async fn upsert(&self, table: &Table, rows: &[Row]) -> Result<u64, PipelineError>;
}
