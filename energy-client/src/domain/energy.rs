use std::fmt;

/// Fuel measured by a meter and priced by a tariff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnergyType {
    Electricity,
    Gas,
}

impl EnergyType {
    pub const ALL: [EnergyType; 2] = [EnergyType::Electricity, EnergyType::Gas];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
        }
    }
}

impl fmt::Display for EnergyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation granularity of a table family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    Daily,
    Weekly,
}

impl Cadence {
    /// Primary-key column of tables with this cadence.
    pub fn key_column(self) -> &'static str {
        match self {
            Self::Daily => "date",
            Self::Weekly => "week",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the series pulled for every energy type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Rates,
    DailyConsumption,
    WeeklyConsumption,
}

impl Feed {
    pub const ALL: [Feed; 3] = [Feed::Rates, Feed::DailyConsumption, Feed::WeeklyConsumption];

    pub fn cadence(self) -> Cadence {
        match self {
            Self::Rates | Self::DailyConsumption => Cadence::Daily,
            Self::WeeklyConsumption => Cadence::Weekly,
        }
    }

    /// Consumption endpoints are per-meter and need credentials; rates are public.
    pub fn is_consumption(self) -> bool {
        !matches!(self, Self::Rates)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rates => "rates",
            Self::DailyConsumption => "daily_consumption",
            Self::WeeklyConsumption => "weekly_consumption",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
