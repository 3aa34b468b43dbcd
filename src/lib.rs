//! Net rate waterfall decomposition for outpatient clinics.
//!
//! This library explains the change in average net revenue per visit between
//! two periods by splitting it across eight business drivers. Three of them
//! (units per visit, copay leakage, write-offs and denials) are measured
//! directly from the period snapshots. The other five (payer mix, allowed
//! rates, CPT mix, operational leakage and documentation issues) share the
//! remainder in fixed proportions. The eight values always sum to the
//! observed change.
//!
//! # Example
//!
//! ```
//! use netrate_waterfall::{decompose, MetricSnapshot, VisitTotals};
//!
//! let start = MetricSnapshot::from(VisitTotals {
//!     visit_count: 100,
//!     total_net_revenue: 8000.0,
//!     total_units: 250.0,
//!     total_copay_collected: 1800.0,
//!     total_copay_expected: 2000.0,
//!     total_writeoffs: 300.0,
//! });
//! let end = MetricSnapshot::from(VisitTotals {
//!     visit_count: 120,
//!     total_net_revenue: 10200.0,
//!     total_units: 320.0,
//!     total_copay_collected: 2100.0,
//!     total_copay_expected: 2200.0,
//!     total_writeoffs: 280.0,
//! });
//!
//! let result = decompose(&start, &end);
//! assert!((result.total_change() - 5.0).abs() < 1e-9);
//! assert!((result.driver_sum() - 5.0).abs() < 1e-6);
//! ```
//!
//! ### Aggregating a visit ledger
//!
//! ```ignore
//! use netrate_waterfall::{ledger, resolve_periods, VarianceEngine, ViewType};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let visits = ledger::load_ledger("visits.csv")?;
//!     let (prior, current) = resolve_periods(ViewType::Mtd, 2025, 11)?;
//!     let result =
//!         ledger::region_waterfall(&visits, &prior, &current, Some("2"), &VarianceEngine::new())?;
//!     result.summary();
//!     Ok(())
//! }
//! ```

use comfy_table::{Cell, Table};
use getset::Getters;
use polars::prelude::PolarsError;
use serde::Serialize;
use thiserror::Error;

pub mod decomposition;
pub mod drivers;
pub mod ledger;
pub mod periods;
pub mod snapshot;

pub use crate::decomposition::{
    compute_raw_drivers, decompose, reconcile, AllocationShares, DecompositionConfig,
    RawDecomposition, Reconciliation, ReconciliationAdjustment, VarianceEngine,
    ALLOWED_RATES_SHARE, CPT_MIX_SHARE, DOCUMENTATION_ISSUES_SHARE, OPERATIONAL_LEAKAGE_SHARE,
    PAYER_MIX_SHARE, RECONCILIATION_TOLERANCE, UNIT_VALUE,
};
pub use crate::drivers::{Driver, DriverSet};
pub use crate::ledger::{DrillLevel, EntityComparison};
pub use crate::periods::{resolve_periods, Period, ViewType};
pub use crate::snapshot::{MetricSnapshot, PerVisitRates, VisitTotals};

/// Error type for the `netrate_waterfall` library.
///
/// The decomposition engine itself never fails; these come from the ledger,
/// period and configuration layers around it.
#[derive(Error, Debug)]
pub enum NetRateError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
    #[error("Invalid view type: {0}")]
    InvalidViewType(String),
    #[error("Invalid drill-down level: {0}")]
    InvalidLevel(String),
    #[error("Invalid driver: {0}")]
    InvalidDriver(String),
    #[error("Missing parent id: {0}")]
    MissingParent(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Holds the decomposition of one period-over-period change.
#[derive(Debug, Clone, Getters, Serialize)]
#[getset(get = "pub")]
pub struct DecompositionResult {
    /// Average net rate of the baseline period.
    start_net_rate: f64,
    /// Average net rate of the comparison period.
    end_net_rate: f64,
    /// `end_net_rate - start_net_rate`.
    total_change: f64,
    /// Per-driver share of `total_change`.
    drivers: DriverSet,
    /// Baseline snapshot.
    start_metrics: MetricSnapshot,
    /// Comparison snapshot.
    end_metrics: MetricSnapshot,
    /// Correction applied during reconciliation, if any.
    #[serde(skip)]
    adjustment: Option<ReconciliationAdjustment>,
}

/// One bar of a waterfall chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallStep {
    pub label: String,
    /// `None` for the start and end bars.
    pub driver: Option<Driver>,
    pub from: f64,
    pub to: f64,
}

impl WaterfallStep {
    pub fn delta(&self) -> f64 {
        self.to - self.from
    }
}

impl DecompositionResult {
    pub(crate) fn new(
        start_net_rate: f64,
        end_net_rate: f64,
        total_change: f64,
        drivers: DriverSet,
        start_metrics: MetricSnapshot,
        end_metrics: MetricSnapshot,
        adjustment: Option<ReconciliationAdjustment>,
    ) -> Self {
        Self {
            start_net_rate,
            end_net_rate,
            total_change,
            drivers,
            start_metrics,
            end_metrics,
            adjustment,
        }
    }

    /// Sum of the eight driver values.
    pub fn driver_sum(&self) -> f64 {
        self.drivers.total()
    }

    /// Whether the drivers add up to the total change within
    /// [`RECONCILIATION_TOLERANCE`].
    pub fn is_reconciled(&self) -> bool {
        (self.driver_sum() - self.total_change).abs() <= RECONCILIATION_TOLERANCE
    }

    /// Bars for a waterfall chart: the start rate, one floating bar per
    /// driver, then the end rate.
    pub fn waterfall(&self) -> Vec<WaterfallStep> {
        let mut steps = Vec::with_capacity(Driver::ALL.len() + 2);
        steps.push(WaterfallStep {
            label: "Start".to_string(),
            driver: None,
            from: 0.0,
            to: self.start_net_rate,
        });
        let mut running = self.start_net_rate;
        for (driver, value) in self.drivers.iter() {
            steps.push(WaterfallStep {
                label: driver.label().to_string(),
                driver: Some(driver),
                from: running,
                to: running + value,
            });
            running += value;
        }
        steps.push(WaterfallStep {
            label: "End".to_string(),
            driver: None,
            from: 0.0,
            to: self.end_net_rate,
        });
        steps
    }

    /// Prints a formatted summary of the decomposition to the console.
    pub fn summary(&self) {
        println!("Net Rate Waterfall");
        println!("========================================");
        println!(
            "Start: {:.2} over {} visits",
            self.start_net_rate, self.start_metrics.visit_count
        );
        println!(
            "End:   {:.2} over {} visits",
            self.end_net_rate, self.end_metrics.visit_count
        );
        println!("Total Change: {:+.4}", self.total_change);
        println!();

        let mut driver_table = Table::new();
        driver_table.set_header(vec!["Driver", "Impact", "Share of Change", "Source"]);
        for (driver, value) in self.drivers.iter() {
            let share = if self.total_change != 0.0 {
                format!("{:.1}%", value / self.total_change * 100.0)
            } else {
                "-".to_string()
            };
            let source = if driver.is_measured() {
                "measured"
            } else {
                "allocated"
            };
            driver_table.add_row(vec![
                Cell::new(driver.label()),
                Cell::new(format!("{:+.4}", value)),
                Cell::new(share),
                Cell::new(source),
            ]);
        }
        println!("Driver Breakdown");
        println!("{}", driver_table);

        if let Some(adjustment) = &self.adjustment {
            println!(
                "\nReconciliation moved {:+.6} onto {}",
                adjustment.amount,
                adjustment.driver.label()
            );
        }
    }

    /// Exports the driver breakdown to a Markdown table.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("### Net Rate Waterfall\n\n");
        md.push_str(&format!(
            "Start rate: {:.2} | End rate: {:.2} | Total change: {:+.4}\n\n",
            self.start_net_rate, self.end_net_rate, self.total_change
        ));
        md.push_str("| Driver | Impact |\n");
        md.push_str("|---|---|\n");
        for (driver, value) in self.drivers.iter() {
            md.push_str(&format!("| {} | {:+.4} |\n", driver.key(), value));
        }
        md
    }

    /// Exports the result to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
