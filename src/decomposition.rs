//! The variance decomposition engine.
//!
//! The change in average net rate between two snapshots is split into three
//! measured drivers (units per visit, copay leakage, write-offs) and five
//! drivers that share whatever the measured ones leave unexplained in fixed
//! proportions. A reconciliation step then forces the eight values to sum to
//! the observed change.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::drivers::{Driver, DriverSet};
use crate::snapshot::{MetricSnapshot, PerVisitRates};
use crate::{DecompositionResult, NetRateError};

/// Dollar value of one additional billed unit per visit.
pub const UNIT_VALUE: f64 = 25.0;
/// Share of the unexplained remainder assigned to payer mix.
pub const PAYER_MIX_SHARE: f64 = 0.35;
/// Share of the unexplained remainder assigned to allowed rates.
pub const ALLOWED_RATES_SHARE: f64 = 0.30;
/// Share of the unexplained remainder assigned to CPT mix.
pub const CPT_MIX_SHARE: f64 = 0.20;
/// Share of the unexplained remainder assigned to operational leakage.
pub const OPERATIONAL_LEAKAGE_SHARE: f64 = 0.10;
/// Share of the unexplained remainder assigned to documentation issues.
pub const DOCUMENTATION_ISSUES_SHARE: f64 = 0.05;
/// Largest drift between the driver sum and the total change left uncorrected.
pub const RECONCILIATION_TOLERANCE: f64 = 0.001;

/// Proportions used to split the unexplained remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationShares {
    pub payer_mix: f64,
    pub allowed_rates: f64,
    pub cpt_mix: f64,
    pub operational_leakage: f64,
    pub documentation_issues: f64,
}

impl Default for AllocationShares {
    fn default() -> Self {
        Self {
            payer_mix: PAYER_MIX_SHARE,
            allowed_rates: ALLOWED_RATES_SHARE,
            cpt_mix: CPT_MIX_SHARE,
            operational_leakage: OPERATIONAL_LEAKAGE_SHARE,
            documentation_issues: DOCUMENTATION_ISSUES_SHARE,
        }
    }
}

impl AllocationShares {
    pub fn total(&self) -> f64 {
        self.payer_mix
            + self.allowed_rates
            + self.cpt_mix
            + self.operational_leakage
            + self.documentation_issues
    }

    fn values(&self) -> [f64; 5] {
        [
            self.payer_mix,
            self.allowed_rates,
            self.cpt_mix,
            self.operational_leakage,
            self.documentation_issues,
        ]
    }
}

/// Known-impact configuration for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecompositionConfig {
    pub unit_value: f64,
    pub shares: AllocationShares,
    pub tolerance: f64,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            unit_value: UNIT_VALUE,
            shares: AllocationShares::default(),
            tolerance: RECONCILIATION_TOLERANCE,
        }
    }
}

impl DecompositionConfig {
    /// Checks a user-supplied configuration. The engine itself accepts any
    /// configuration; this is for callers that take overrides from outside.
    pub fn validate(&self) -> Result<(), NetRateError> {
        if !self.unit_value.is_finite() || self.unit_value < 0.0 {
            return Err(NetRateError::InvalidConfig(format!(
                "unit value must be a non-negative number, got {}",
                self.unit_value
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(NetRateError::InvalidConfig(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.shares.values().iter().any(|s| !s.is_finite()) {
            return Err(NetRateError::InvalidConfig(
                "allocation shares must be finite".to_string(),
            ));
        }
        let total = self.shares.total();
        if (total - 1.0).abs() > RECONCILIATION_TOLERANCE {
            return Err(NetRateError::InvalidConfig(format!(
                "allocation shares must sum to 1, got {:.4}",
                total
            )));
        }
        Ok(())
    }
}

/// Everything computed before reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawDecomposition {
    pub start_net_rate: f64,
    pub end_net_rate: f64,
    pub total_change: f64,
    pub start_rates: PerVisitRates,
    pub end_rates: PerVisitRates,
    pub known_impacts: f64,
    pub remaining_change: f64,
    pub drivers: DriverSet,
}

/// A correction applied by [`reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReconciliationAdjustment {
    pub driver: Driver,
    pub amount: f64,
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    pub drivers: DriverSet,
    pub adjustment: Option<ReconciliationAdjustment>,
}

/// Computes the eight drivers before reconciliation.
pub fn compute_raw_drivers(
    config: &DecompositionConfig,
    start: &MetricSnapshot,
    end: &MetricSnapshot,
) -> RawDecomposition {
    let start_net_rate = start.average_net_rate;
    let end_net_rate = end.average_net_rate;
    let total_change = end_net_rate - start_net_rate;

    let start_rates = start.per_visit_rates();
    let end_rates = end.per_visit_rates();

    let units_per_visit_impact =
        (end_rates.units_per_visit - start_rates.units_per_visit) * config.unit_value;
    let copay_leakage_impact =
        end_rates.copay_leakage_per_visit - start_rates.copay_leakage_per_visit;
    let writeoffs_impact = end_rates.writeoffs_per_visit - start_rates.writeoffs_per_visit;

    let known_impacts = units_per_visit_impact + copay_leakage_impact + writeoffs_impact;
    let remaining_change = total_change - known_impacts;

    let shares = &config.shares;
    let drivers = DriverSet {
        payer_mix: remaining_change * shares.payer_mix,
        allowed_rates: remaining_change * shares.allowed_rates,
        units_per_visit: units_per_visit_impact,
        cpt_mix: remaining_change * shares.cpt_mix,
        copay_leakage: copay_leakage_impact,
        writeoffs_denials: writeoffs_impact,
        operational_leakage: remaining_change * shares.operational_leakage,
        documentation_issues: remaining_change * shares.documentation_issues,
    };

    RawDecomposition {
        start_net_rate,
        end_net_rate,
        total_change,
        start_rates,
        end_rates,
        known_impacts,
        remaining_change,
        drivers,
    }
}

/// Forces the drivers to sum to `total_change`.
///
/// When the sum drifts by more than `tolerance`, the whole residual is added
/// to the driver with the largest absolute value.
pub fn reconcile(drivers: DriverSet, total_change: f64, tolerance: f64) -> Reconciliation {
    let driver_sum = drivers.total();
    let drift = (driver_sum - total_change).abs();
    // A NaN drift never counts as exceeding the tolerance.
    if drift.is_nan() || drift <= tolerance {
        return Reconciliation {
            drivers,
            adjustment: None,
        };
    }

    let mut drivers = drivers;
    let target = drivers.largest_magnitude();
    let amount = total_change - driver_sum;
    *drivers.get_mut(target) += amount;
    debug!(driver = %target, amount, "reconciled driver sum");

    Reconciliation {
        drivers,
        adjustment: Some(ReconciliationAdjustment {
            driver: target,
            amount,
        }),
    }
}

/// Stateless decomposition engine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VarianceEngine {
    config: DecompositionConfig,
}

impl VarianceEngine {
    /// Creates an engine with the default business constants.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DecompositionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecompositionConfig {
        &self.config
    }

    /// Sets the dollar value of one billed unit per visit.
    pub fn unit_value(&mut self, value: f64) -> &mut Self {
        self.config.unit_value = value;
        self
    }

    /// Sets the proportions used for the unexplained remainder.
    pub fn shares(&mut self, shares: AllocationShares) -> &mut Self {
        self.config.shares = shares;
        self
    }

    /// Sets the reconciliation tolerance.
    pub fn tolerance(&mut self, tolerance: f64) -> &mut Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Decomposes the change in average net rate from `start` to `end`.
    pub fn decompose(&self, start: &MetricSnapshot, end: &MetricSnapshot) -> DecompositionResult {
        let raw = compute_raw_drivers(&self.config, start, end);
        let reconciled = reconcile(raw.drivers, raw.total_change, self.config.tolerance);
        DecompositionResult::new(
            raw.start_net_rate,
            raw.end_net_rate,
            raw.total_change,
            reconciled.drivers,
            *start,
            *end,
            reconciled.adjustment,
        )
    }
}

/// Decomposes with the default business constants.
pub fn decompose(start: &MetricSnapshot, end: &MetricSnapshot) -> DecompositionResult {
    VarianceEngine::default().decompose(start, end)
}
