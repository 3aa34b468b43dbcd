//! Aggregate metric snapshots for one reporting period.

use serde::{Deserialize, Serialize};

/// Raw sums over the visits of one period, as produced by an aggregation
/// over the visit ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitTotals {
    pub visit_count: i64,
    pub total_net_revenue: f64,
    pub total_units: f64,
    pub total_copay_collected: f64,
    pub total_copay_expected: f64,
    pub total_writeoffs: f64,
}

/// Summary statistics for one period (and optionally one region).
///
/// Build it from [`VisitTotals`] so that `average_net_rate` is always derived
/// the same way: `total_net_revenue / visit_count` when there is at least one
/// visit, and `0.0` otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Number of visit records in the period.
    pub visit_count: i64,
    /// Net revenue collected across all visits.
    pub total_net_revenue: f64,
    /// Mean net revenue per visit.
    pub average_net_rate: f64,
    /// Billed clinical units across all visits.
    pub total_units: f64,
    /// Copay actually collected.
    pub total_copay_collected: f64,
    /// Copay contractually owed.
    pub total_copay_expected: f64,
    /// Allowed amounts formally written off.
    pub total_writeoffs: f64,
}

impl From<VisitTotals> for MetricSnapshot {
    fn from(totals: VisitTotals) -> Self {
        let average_net_rate = if totals.visit_count > 0 {
            totals.total_net_revenue / totals.visit_count as f64
        } else {
            0.0
        };
        Self {
            visit_count: totals.visit_count,
            total_net_revenue: totals.total_net_revenue,
            average_net_rate,
            total_units: totals.total_units,
            total_copay_collected: totals.total_copay_collected,
            total_copay_expected: totals.total_copay_expected,
            total_writeoffs: totals.total_writeoffs,
        }
    }
}

impl MetricSnapshot {
    /// A snapshot for a period with no visits at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Per-visit rates used by the measured drivers.
    pub fn per_visit_rates(&self) -> PerVisitRates {
        PerVisitRates::from_snapshot(self)
    }
}

/// Per-visit derived rates of one snapshot.
///
/// A zero visit count divides by 1, so each rate is then the raw numerator.
/// This differs from `MetricSnapshot::average_net_rate`, which is 0 for zero
/// visits; decomposition output on zero-visit inputs depends on both guards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerVisitRates {
    pub units_per_visit: f64,
    pub copay_leakage_per_visit: f64,
    pub writeoffs_per_visit: f64,
}

impl PerVisitRates {
    pub fn from_snapshot(snapshot: &MetricSnapshot) -> Self {
        let visits = if snapshot.visit_count == 0 {
            1.0
        } else {
            snapshot.visit_count as f64
        };
        Self {
            units_per_visit: snapshot.total_units / visits,
            copay_leakage_per_visit: (snapshot.total_copay_expected
                - snapshot.total_copay_collected)
                / visits,
            writeoffs_per_visit: snapshot.total_writeoffs / visits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_net_rate() {
        let snapshot = MetricSnapshot::from(VisitTotals {
            visit_count: 100,
            total_net_revenue: 8000.0,
            ..Default::default()
        });
        assert!((snapshot.average_net_rate - 80.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_visits_has_zero_rate() {
        let snapshot = MetricSnapshot::from(VisitTotals {
            visit_count: 0,
            total_net_revenue: 500.0,
            ..Default::default()
        });
        assert_eq!(snapshot.average_net_rate, 0.0);
        assert_eq!(snapshot.total_net_revenue, 500.0);
    }

    #[test]
    fn test_per_visit_rates() {
        let snapshot = MetricSnapshot::from(VisitTotals {
            visit_count: 120,
            total_net_revenue: 10200.0,
            total_units: 320.0,
            total_copay_collected: 2100.0,
            total_copay_expected: 2200.0,
            total_writeoffs: 280.0,
        });
        let rates = snapshot.per_visit_rates();
        assert!((rates.units_per_visit - 320.0 / 120.0).abs() < 1e-12);
        assert!((rates.copay_leakage_per_visit - 100.0 / 120.0).abs() < 1e-12);
        assert!((rates.writeoffs_per_visit - 280.0 / 120.0).abs() < 1e-12);
    }

    // Zero visits divide by 1, not 0: the raw totals come straight through
    // even though `average_net_rate` is 0 for the same snapshot.
    #[test]
    fn test_zero_visit_rates_use_unit_denominator() {
        let snapshot = MetricSnapshot::from(VisitTotals {
            visit_count: 0,
            total_net_revenue: 90.0,
            total_units: 3.0,
            total_copay_collected: 10.0,
            total_copay_expected: 25.0,
            total_writeoffs: 7.0,
        });
        let rates = snapshot.per_visit_rates();
        assert_eq!(snapshot.average_net_rate, 0.0);
        assert_eq!(rates.units_per_visit, 3.0);
        assert_eq!(rates.copay_leakage_per_visit, 15.0);
        assert_eq!(rates.writeoffs_per_visit, 7.0);
    }

    #[test]
    fn test_empty_snapshot_rates_are_zero() {
        let rates = MetricSnapshot::empty().per_visit_rates();
        assert_eq!(rates, PerVisitRates::default());
    }
}
