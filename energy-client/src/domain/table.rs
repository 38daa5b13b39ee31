use super::{EnergyType, Feed};

/// Handle on one destination table.
///
/// Names are derived from closed enums and a year, never from user input, so
/// they are safe to interpolate into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    name: String,
    energy: EnergyType,
    feed: Feed,
    year: Option<i32>,
}

impl Table {
    pub fn rates(energy: EnergyType) -> Self {
        Self {
            name: format!("{}_rates", energy.as_str()),
            energy,
            feed: Feed::Rates,
            year: None,
        }
    }

    pub fn daily_consumption(energy: EnergyType) -> Self {
        Self {
            name: format!("{}_consumption", energy.as_str()),
            energy,
            feed: Feed::DailyConsumption,
            year: None,
        }
    }

    /// Weekly tables are partitioned by ISO year.
    pub fn weekly_consumption(energy: EnergyType, iso_year: i32) -> Self {
        Self {
            name: format!("{}_weekly_consumption_{iso_year}", energy.as_str()),
            energy,
            feed: Feed::WeeklyConsumption,
            year: Some(iso_year),
        }
    }

    /// `iso_year` is only used by weekly feeds.
    pub fn for_feed(energy: EnergyType, feed: Feed, iso_year: i32) -> Self {
        match feed {
            Feed::Rates => Self::rates(energy),
            Feed::DailyConsumption => Self::daily_consumption(energy),
            Feed::WeeklyConsumption => Self::weekly_consumption(energy, iso_year),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn energy(&self) -> EnergyType {
        self.energy
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn key_column(&self) -> &'static str {
        self.feed.cadence().key_column()
    }
}
