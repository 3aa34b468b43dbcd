//! Reporting periods for the MTD, QTD and YTD views.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::NetRateError;

/// Which slice of the year the comparison period covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewType {
    /// Month to date: the selected month alone.
    Mtd,
    /// Quarter to date: from the first month of the quarter.
    Qtd,
    /// Year to date: from January.
    Ytd,
}

impl FromStr for ViewType {
    type Err = NetRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MTD" => Ok(ViewType::Mtd),
            "QTD" => Ok(ViewType::Qtd),
            "YTD" => Ok(ViewType::Ytd),
            _ => Err(NetRateError::InvalidViewType(s.to_string())),
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ViewType::Mtd => "MTD",
            ViewType::Qtd => "QTD",
            ViewType::Ytd => "YTD",
        };
        write!(f, "{}", name)
    }
}

/// A closed date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, NetRateError> {
        if end < start {
            return Err(NetRateError::InvalidPeriod(format!(
                "{} is before {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole calendar month containing `date`.
    pub fn month_of(date: NaiveDate) -> Result<Self, NetRateError> {
        let start = first_of_month(date.year(), date.month())?;
        Ok(Self {
            start,
            end: last_of_month(date.year(), date.month())?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// `start` as `YYYY-MM-DD`.
    pub fn start_key(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// `end` as `YYYY-MM-DD`.
    pub fn end_key(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}..{}", self.start_key(), self.end_key())
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, NetRateError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| NetRateError::InvalidPeriod(format!("{}-{:02}", year, month)))
}

fn last_of_month(year: i32, month: u32) -> Result<NaiveDate, NetRateError> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    first_of_month(next_year, next_month)?
        .pred_opt()
        .ok_or_else(|| NetRateError::InvalidPeriod(format!("{}-{:02}", year, month)))
}

/// Resolves the `(prior, current)` pair for a view ending in `month` of
/// `year`.
///
/// The current period runs from the start of the view (the month itself,
/// its quarter, or January) to the last day of `month`. The prior period is
/// the full calendar month just before the current period starts.
pub fn resolve_periods(
    view: ViewType,
    year: i32,
    month: u32,
) -> Result<(Period, Period), NetRateError> {
    if !(1..=12).contains(&month) {
        return Err(NetRateError::InvalidPeriod(format!(
            "month must be between 1 and 12, got {}",
            month
        )));
    }

    let start_month = match view {
        ViewType::Mtd => month,
        ViewType::Qtd => ((month - 1) / 3) * 3 + 1,
        ViewType::Ytd => 1,
    };
    let current = Period::new(
        first_of_month(year, start_month)?,
        last_of_month(year, month)?,
    )?;

    let prior_end = current
        .start
        .pred_opt()
        .ok_or_else(|| NetRateError::InvalidPeriod(current.to_string()))?;
    let prior = Period::month_of(prior_end)?;

    Ok((prior, current))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_mtd_compares_previous_month() {
        let (prior, current) = resolve_periods(ViewType::Mtd, 2025, 11).unwrap();
        assert_eq!(prior, Period::new(date(2025, 10, 1), date(2025, 10, 31)).unwrap());
        assert_eq!(current, Period::new(date(2025, 11, 1), date(2025, 11, 30)).unwrap());
    }

    #[test]
    fn test_mtd_january_wraps_to_december() {
        let (prior, current) = resolve_periods(ViewType::Mtd, 2025, 1).unwrap();
        assert_eq!(prior.to_string(), "2024-12-01..2024-12-31");
        assert_eq!(current.to_string(), "2025-01-01..2025-01-31");
    }

    #[test]
    fn test_qtd_starts_at_quarter() {
        let (prior, current) = resolve_periods(ViewType::Qtd, 2025, 5).unwrap();
        assert_eq!(current.to_string(), "2025-04-01..2025-05-31");
        assert_eq!(prior.to_string(), "2025-03-01..2025-03-31");
    }

    #[test]
    fn test_ytd_compares_prior_december() {
        let (prior, current) = resolve_periods(ViewType::Ytd, 2025, 3).unwrap();
        assert_eq!(current.to_string(), "2025-01-01..2025-03-31");
        assert_eq!(prior.to_string(), "2024-12-01..2024-12-31");
    }

    #[test]
    fn test_leap_february() {
        let (_, current) = resolve_periods(ViewType::Mtd, 2024, 2).unwrap();
        assert_eq!(current.end, date(2024, 2, 29));
    }

    #[test]
    fn test_invalid_month() {
        assert!(matches!(
            resolve_periods(ViewType::Mtd, 2025, 13),
            Err(NetRateError::InvalidPeriod(_))
        ));
        assert!(resolve_periods(ViewType::Ytd, 2025, 0).is_err());
    }

    #[test]
    fn test_view_type_parsing() {
        assert_eq!("qtd".parse::<ViewType>().unwrap(), ViewType::Qtd);
        assert_eq!("YTD".parse::<ViewType>().unwrap(), ViewType::Ytd);
        assert!("WTD".parse::<ViewType>().is_err());
    }

    #[test]
    fn test_period_is_inclusive() {
        let period = Period::month_of(date(2025, 6, 15)).unwrap();
        assert!(period.contains(date(2025, 6, 1)));
        assert!(period.contains(date(2025, 6, 30)));
        assert!(!period.contains(date(2025, 7, 1)));
    }

    #[test]
    fn test_period_rejects_reversed_range() {
        assert!(Period::new(date(2025, 2, 1), date(2025, 1, 1)).is_err());
    }
}
