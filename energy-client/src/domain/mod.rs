mod energy;
mod rows;
mod table;

pub use energy::{Cadence, EnergyType, Feed};
pub use rows::{ConsumptionRow, IsoWeek, RateRow, Row, RowKey, WeeklyConsumptionRow};
pub use table::Table;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("ISO week label must be two digits between 01 and 53, got {0:?}")]
    InvalidWeek(String),
    #[error("week {week} does not exist in ISO year {year}")]
    WeekOutOfYear { week: IsoWeek, year: i32 },
}
