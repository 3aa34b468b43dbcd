//! The eight business drivers of a net rate change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::NetRateError;

/// One named category absorbing a portion of the period-over-period change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    PayerMix,
    AllowedRates,
    UnitsPerVisit,
    CptMix,
    CopayLeakage,
    WriteoffsDenials,
    OperationalLeakage,
    DocumentationIssues,
}

impl Driver {
    /// All drivers in reporting order.
    pub const ALL: [Driver; 8] = [
        Driver::PayerMix,
        Driver::AllowedRates,
        Driver::UnitsPerVisit,
        Driver::CptMix,
        Driver::CopayLeakage,
        Driver::WriteoffsDenials,
        Driver::OperationalLeakage,
        Driver::DocumentationIssues,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Driver::PayerMix => "payer_mix",
            Driver::AllowedRates => "allowed_rates",
            Driver::UnitsPerVisit => "units_per_visit",
            Driver::CptMix => "cpt_mix",
            Driver::CopayLeakage => "copay_leakage",
            Driver::WriteoffsDenials => "writeoffs_denials",
            Driver::OperationalLeakage => "operational_leakage",
            Driver::DocumentationIssues => "documentation_issues",
        }
    }

    /// Human-readable label for tables.
    pub fn label(&self) -> &'static str {
        match self {
            Driver::PayerMix => "Payer Mix",
            Driver::AllowedRates => "Allowed Rates",
            Driver::UnitsPerVisit => "Units per Visit",
            Driver::CptMix => "CPT Mix",
            Driver::CopayLeakage => "Copay Leakage",
            Driver::WriteoffsDenials => "Write-offs & Denials",
            Driver::OperationalLeakage => "Operational Leakage",
            Driver::DocumentationIssues => "Documentation Issues",
        }
    }

    /// Whether the driver is measured from the snapshots rather than
    /// allocated from the unexplained remainder.
    pub fn is_measured(&self) -> bool {
        matches!(
            self,
            Driver::UnitsPerVisit | Driver::CopayLeakage | Driver::WriteoffsDenials
        )
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Driver {
    type Err = NetRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Driver::ALL
            .iter()
            .copied()
            .find(|d| d.key() == s)
            .ok_or_else(|| NetRateError::InvalidDriver(s.to_string()))
    }
}

/// Signed dollar amount per driver. Serializes as an 8-key object in
/// reporting order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverSet {
    pub payer_mix: f64,
    pub allowed_rates: f64,
    pub units_per_visit: f64,
    pub cpt_mix: f64,
    pub copay_leakage: f64,
    pub writeoffs_denials: f64,
    pub operational_leakage: f64,
    pub documentation_issues: f64,
}

impl DriverSet {
    pub fn get(&self, driver: Driver) -> f64 {
        match driver {
            Driver::PayerMix => self.payer_mix,
            Driver::AllowedRates => self.allowed_rates,
            Driver::UnitsPerVisit => self.units_per_visit,
            Driver::CptMix => self.cpt_mix,
            Driver::CopayLeakage => self.copay_leakage,
            Driver::WriteoffsDenials => self.writeoffs_denials,
            Driver::OperationalLeakage => self.operational_leakage,
            Driver::DocumentationIssues => self.documentation_issues,
        }
    }

    pub fn get_mut(&mut self, driver: Driver) -> &mut f64 {
        match driver {
            Driver::PayerMix => &mut self.payer_mix,
            Driver::AllowedRates => &mut self.allowed_rates,
            Driver::UnitsPerVisit => &mut self.units_per_visit,
            Driver::CptMix => &mut self.cpt_mix,
            Driver::CopayLeakage => &mut self.copay_leakage,
            Driver::WriteoffsDenials => &mut self.writeoffs_denials,
            Driver::OperationalLeakage => &mut self.operational_leakage,
            Driver::DocumentationIssues => &mut self.documentation_issues,
        }
    }

    /// `(driver, value)` pairs in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (Driver, f64)> + '_ {
        Driver::ALL.iter().map(move |&d| (d, self.get(d)))
    }

    /// Sum of all eight values, accumulated in reporting order.
    pub fn total(&self) -> f64 {
        self.iter().map(|(_, v)| v).sum()
    }

    /// The driver with the largest absolute value. Ties go to the driver
    /// that comes first in reporting order.
    pub fn largest_magnitude(&self) -> Driver {
        let mut best = Driver::ALL[0];
        let mut best_abs = self.get(best).abs();
        for (driver, value) in self.iter().skip(1) {
            if value.abs() > best_abs {
                best = driver;
                best_abs = value.abs();
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_round_trips_through_key() {
        for driver in Driver::ALL {
            assert_eq!(driver.key().parse::<Driver>().unwrap(), driver);
        }
        assert!("bogus".parse::<Driver>().is_err());
    }

    #[test]
    fn test_measured_drivers() {
        let measured: Vec<Driver> = Driver::ALL.into_iter().filter(|d| d.is_measured()).collect();
        assert_eq!(
            measured,
            vec![
                Driver::UnitsPerVisit,
                Driver::CopayLeakage,
                Driver::WriteoffsDenials
            ]
        );
    }

    #[test]
    fn test_largest_magnitude_uses_absolute_value() {
        let drivers = DriverSet {
            payer_mix: 1.0,
            copay_leakage: -3.5,
            cpt_mix: 2.0,
            ..Default::default()
        };
        assert_eq!(drivers.largest_magnitude(), Driver::CopayLeakage);
    }

    #[test]
    fn test_largest_magnitude_tie_prefers_first() {
        let drivers = DriverSet {
            allowed_rates: -2.0,
            writeoffs_denials: 2.0,
            ..Default::default()
        };
        assert_eq!(drivers.largest_magnitude(), Driver::AllowedRates);
        assert_eq!(DriverSet::default().largest_magnitude(), Driver::PayerMix);
    }

    #[test]
    fn test_serializes_in_reporting_order() {
        let json = serde_json::to_string(&DriverSet::default()).unwrap();
        let keys: Vec<&str> = Driver::ALL.iter().map(|d| d.key()).collect();
        let mut last = 0;
        for key in keys {
            let pos = json.find(&format!("\"{}\"", key)).expect("missing driver key");
            assert!(pos >= last);
            last = pos;
        }
    }
}
