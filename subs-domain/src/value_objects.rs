//! Value Objects for the subscriptions domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object and entity validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Month/year could not be parsed or is out of range
    #[error("Invalid month: {0}")]
    InvalidMonth(String),

    /// Service name is empty
    #[error("Invalid service: {0}")]
    InvalidService(String),

    /// Cost is negative
    #[error("Invalid cost: {0}")]
    InvalidCost(String),

    /// End date precedes start date
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
}

// =============================================================================
// Month
// =============================================================================

/// A calendar month of a given year (e.g., `03-2025`).
///
/// Subscription dates are kept at month granularity; the day of month is
/// never significant. Ordering is chronological.
///
/// # Invariants
/// - `month` is in `1..=12`
/// - `year` is in `1..=9999`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    // Field order matters: derived `Ord` compares year first.
    year: i32,
    month: u32,
}

impl Month {
    /// Wire format used by the API (`MM-YYYY`)
    pub const FORMAT: &'static str = "MM-YYYY";

    /// Create a new Month with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidMonth` if the month is not in 1..=12 or
    /// the year is not in 1..=9999
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::InvalidMonth(format!("month must be 1..=12, got {}", month)));
        }
        if !(1..=9999).contains(&year) {
            return Err(DomainError::InvalidMonth(format!("year must be 1..=9999, got {}", year)));
        }
        Ok(Self { year, month })
    }

    /// Parse a month in `MM-YYYY` form
    ///
    /// # Examples
    /// ```
    /// # use subs_domain::Month;
    /// let month = Month::parse("07-2025").unwrap();
    /// assert_eq!(month.year(), 2025);
    /// assert_eq!(month.month(), 7);
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidMonth` if the input is not `MM-YYYY`
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let invalid = || {
            DomainError::InvalidMonth(format!("expected {}, got {:?}", Self::FORMAT, input))
        };

        let (month, year) = input.split_once('-').ok_or_else(invalid)?;
        if month.len() != 2 || year.len() != 4 {
            return Err(invalid());
        }
        if !month.bytes().chain(year.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let month: u32 = month.parse().map_err(|_| invalid())?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }

    /// Calendar year
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month (1..=12)
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Months elapsed since January of year 0.
    ///
    /// Differences between ordinals give month distances.
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    /// First day of this month (the persisted form)
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("year and month are validated at construction")
    }
}

impl TryFrom<NaiveDate> for Month {
    type Error = DomainError;

    /// Canonicalize a date to its month, dropping the day
    fn try_from(date: NaiveDate) -> Result<Self, Self::Error> {
        Self::new(date.year(), date.month())
    }
}

impl From<Month> for NaiveDate {
    fn from(month: Month) -> Self {
        month.first_day()
    }
}

impl FromStr for Month {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month, self.year)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Month::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_parse() {
        let month = Month::parse("03-2024").unwrap();
        assert_eq!(month.year(), 2024);
        assert_eq!(month.month(), 3);
        assert_eq!(month.to_string(), "03-2024");
    }

    #[test]
    fn test_month_parse_rejects_bad_input() {
        for input in ["3-2024", "13-2024", "00-2024", "03/2024", "2024-03", "03-24", "ab-2024", ""] {
            assert!(Month::parse(input).is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_month_ordering_is_chronological() {
        let dec_2023 = Month::new(2023, 12).unwrap();
        let jan_2024 = Month::new(2024, 1).unwrap();
        let feb_2024 = Month::new(2024, 2).unwrap();

        assert!(dec_2023 < jan_2024);
        assert!(jan_2024 < feb_2024);
        assert_eq!(jan_2024.ordinal() - dec_2023.ordinal(), 1);
    }

    #[test]
    fn test_month_from_date_drops_day() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 17).unwrap();
        let month = Month::try_from(date).unwrap();

        assert_eq!(month, Month::new(2024, 6).unwrap());
        assert_eq!(month.first_day(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }

    #[test]
    fn test_month_serde_uses_wire_format() {
        let month = Month::new(2025, 1).unwrap();
        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"01-2025\"");

        let back: Month = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month);

        assert!(serde_json::from_str::<Month>("\"2025-01\"").is_err());
    }
}
