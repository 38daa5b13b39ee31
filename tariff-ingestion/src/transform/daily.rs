use energy_client::domain::{ConsumptionRow, Feed, RateRow, Row};

use super::{local_date_field, number_field, optional_number_field, project_interval, TARIFF_TIMEZONE};
use crate::pipeline::{PipelineError, RawRecord};

/// Normalizer for the two daily feeds.
#[derive(Debug, Clone, PartialEq)]
pub enum DailyNormalizer {
    Rates,
    /// Consumption readings, multiplied into kWh by the factor.
    Consumption { conversion_factor: f64 },
}

impl DailyNormalizer {
    pub fn rates() -> Self {
        Self::Rates
    }

    pub fn consumption(conversion_factor: f64) -> Self {
        Self::Consumption { conversion_factor }
    }

    pub fn feed(&self) -> Feed {
        match self {
            Self::Rates => Feed::Rates,
            Self::Consumption { .. } => Feed::DailyConsumption,
        }
    }

    pub fn normalize(&self, raw: &[RawRecord]) -> Result<Vec<Row>, PipelineError> {
        match self {
            Self::Rates => {
                let mut rates = raw
                    .iter()
                    .enumerate()
                    .map(|(i, rec)| rate(rec, i))
                    .collect::<Result<Vec<_>, _>>()?;
                rates.sort_by_key(|r| r.date);
                Ok(rates.into_iter().map(Row::Rate).collect())
            }
            Self::Consumption { conversion_factor } => {
                let mut days = raw
                    .iter()
                    .enumerate()
                    .map(|(i, rec)| project_interval(rec, i, *conversion_factor))
                    .collect::<Result<Vec<_>, _>>()?;
                days.sort_by_key(|d| d.date);
                // The newest day is still accumulating readings.
                days.pop();
                Ok(days
                    .into_iter()
                    .map(|d| {
                        Row::Consumption(ConsumptionRow {
                            date: d.date,
                            consumption: d.consumption,
                        })
                    })
                    .collect())
            }
        }
    }
}

fn rate(record: &RawRecord, index: usize) -> Result<RateRow, PipelineError> {
    Ok(RateRow {
        date: local_date_field(record, "valid_from", index, TARIFF_TIMEZONE)?,
        unit_rate_exc_vat: optional_number_field(record, "value_exc_vat", index)?,
        unit_rate_inc_vat: number_field(record, "value_inc_vat", index)?,
    })
}
