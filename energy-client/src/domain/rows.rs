use std::{fmt, str::FromStr};

use time::{Date, Weekday};

use super::DomainError;

/// ISO-8601 week number, rendered as a zero-padded two-digit label ("01".."53").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsoWeek(u8);

impl IsoWeek {
    pub fn new(number: u8) -> Result<Self, DomainError> {
        if (1..=53).contains(&number) {
            Ok(Self(number))
        } else {
            Err(DomainError::InvalidWeek(number.to_string()))
        }
    }

    /// Week the given date falls in. Near new year this may belong to the
    /// neighbouring ISO year; see `Date::to_iso_week_date`.
    pub fn of(date: Date) -> Self {
        Self(date.iso_week())
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Monday starting this week in `iso_year`.
    pub fn monday(self, iso_year: i32) -> Result<Date, DomainError> {
        Date::from_iso_week_date(iso_year, self.0, Weekday::Monday)
            .map_err(|_| DomainError::WeekOutOfYear { week: self, year: iso_year })
    }
}

impl fmt::Display for IsoWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for IsoWeek {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 2 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::InvalidWeek(s.to_string()));
        }
        let number: u8 = trimmed
            .parse()
            .map_err(|_| DomainError::InvalidWeek(s.to_string()))?;
        Self::new(number).map_err(|_| DomainError::InvalidWeek(s.to_string()))
    }
}

/// Primary-key value of a stored row. Only keys from the same table are
/// meaningfully comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Date(Date),
    Week(IsoWeek),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{d}"),
            Self::Week(w) => write!(f, "{w}"),
        }
    }
}

/// Unit rate in force from `date`, in pence per kWh.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RateRow {
    pub date: Date,
    pub unit_rate_exc_vat: Option<f64>,
    pub unit_rate_inc_vat: f64,
}

/// Energy used on `date`, in kWh.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ConsumptionRow {
    pub date: Date,
    pub consumption: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyConsumptionRow {
    pub week: IsoWeek,
    /// Start of the source interval the reading covers.
    pub date: Date,
    pub consumption: f64,
}

/// A normalized row shaped for its destination table.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Rate(RateRow),
    Consumption(ConsumptionRow),
    WeeklyConsumption(WeeklyConsumptionRow),
}

impl Row {
    pub fn key(&self) -> RowKey {
        match self {
            Self::Rate(r) => RowKey::Date(r.date),
            Self::Consumption(c) => RowKey::Date(c.date),
            Self::WeeklyConsumption(w) => RowKey::Week(w.week),
        }
    }

    pub fn date(&self) -> Date {
        match self {
            Self::Rate(r) => r.date,
            Self::Consumption(c) => c.date,
            Self::WeeklyConsumption(w) => w.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn week_labels_are_zero_padded() {
        assert_eq!(IsoWeek::new(3).unwrap().to_string(), "03");
        assert_eq!(IsoWeek::new(52).unwrap().to_string(), "52");
    }

    #[test]
    fn week_parsing_rejects_out_of_range_and_unpadded_labels() {
        assert_eq!("07".parse::<IsoWeek>().unwrap().number(), 7);
        assert!("00".parse::<IsoWeek>().is_err());
        assert!("54".parse::<IsoWeek>().is_err());
        assert!("7".parse::<IsoWeek>().is_err());
        assert!("w7".parse::<IsoWeek>().is_err());
    }

    #[test]
    fn week_of_new_year_dates_follows_iso_rules() {
        // 2021-01-01 is a Friday, still in week 53 of 2020.
        assert_eq!(IsoWeek::of(date!(2021 - 01 - 01)).number(), 53);
        assert_eq!(IsoWeek::of(date!(2021 - 01 - 04)).number(), 1);
        // 2025-12-29 is the Monday opening week 1 of 2026.
        assert_eq!(IsoWeek::of(date!(2025 - 12 - 29)).number(), 1);
    }

    #[test]
    fn monday_of_week_resolves_within_iso_year() {
        let w = IsoWeek::new(1).unwrap();
        assert_eq!(w.monday(2026).unwrap(), date!(2025 - 12 - 29));
        assert_eq!(IsoWeek::new(10).unwrap().monday(2024).unwrap(), date!(2024 - 03 - 04));
        assert!(IsoWeek::new(53).unwrap().monday(2024).is_err());
    }

    #[test]
    fn week_keys_order_numerically() {
        let a = RowKey::Week("09".parse().unwrap());
        let b = RowKey::Week("10".parse().unwrap());
        assert!(a < b);
        assert_eq!(b.to_string(), "10");
        assert_eq!(RowKey::Date(date!(2024 - 01 - 02)).to_string(), "2024-01-02");
    }
}
