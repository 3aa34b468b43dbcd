//! Aggregation of a visit ledger into metric snapshots.
//!
//! The ledger is a flat `DataFrame` with one row per visit. Dates are
//! compared as `YYYY-MM-DD` strings, so both string and date typed
//! `visit_date` columns work, and both ends of a period are inclusive.

use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::decomposition::VarianceEngine;
use crate::periods::Period;
use crate::snapshot::{MetricSnapshot, VisitTotals};
use crate::{DecompositionResult, NetRateError};

pub const VISIT_DATE: &str = "visit_date";
pub const REGION_ID: &str = "region_id";
pub const NET_REVENUE: &str = "net_revenue";
pub const TOTAL_UNITS: &str = "total_units";
pub const COPAY_COLLECTED: &str = "copay_collected";
pub const COPAY_EXPECTED: &str = "copay_expected";
pub const WRITE_OFF_AMOUNT: &str = "write_off_amount";

const AMOUNT_COLUMNS: [&str; 5] = [
    NET_REVENUE,
    TOTAL_UNITS,
    COPAY_COLLECTED,
    COPAY_EXPECTED,
    WRITE_OFF_AMOUNT,
];

/// Reads a visit ledger from a CSV file with a header row.
pub fn load_ledger<P: AsRef<Path>>(path: P) -> Result<DataFrame, NetRateError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(NetRateError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("ledger file {} does not exist", path.display()),
        )));
    }
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .finish()?
        .collect()?;
    info!(rows = df.height(), path = %path.display(), "loaded visit ledger");
    Ok(df)
}

fn require_columns(df: &DataFrame, columns: &[&str]) -> Result<(), NetRateError> {
    let present = df.get_column_names();
    for c in columns {
        if !present.iter().any(|p| p.as_str() == *c) {
            return Err(NetRateError::ColumnNotFound(c.to_string()));
        }
    }
    Ok(())
}

fn period_filter(period: &Period) -> Expr {
    let date = col(VISIT_DATE).cast(DataType::String);
    date.clone()
        .gt_eq(lit(period.start_key()))
        .and(date.lt_eq(lit(period.end_key())))
}

fn id_filter(column: &str, value: &str) -> Expr {
    col(column)
        .cast(DataType::String)
        .eq(lit(value.to_string()))
}

fn total_exprs() -> Vec<Expr> {
    vec![
        len().cast(DataType::Int64).alias("visit_count"),
        col(NET_REVENUE)
            .cast(DataType::Float64)
            .sum()
            .alias("total_net_revenue"),
        col(TOTAL_UNITS)
            .cast(DataType::Float64)
            .sum()
            .alias("total_units"),
        col(COPAY_COLLECTED)
            .cast(DataType::Float64)
            .sum()
            .alias("total_copay_collected"),
        col(COPAY_EXPECTED)
            .cast(DataType::Float64)
            .sum()
            .alias("total_copay_expected"),
        col(WRITE_OFF_AMOUNT)
            .cast(DataType::Float64)
            .sum()
            .alias("total_writeoffs"),
    ]
}

fn float_at(df: &DataFrame, name: &str, row: usize) -> Result<f64, NetRateError> {
    Ok(df.column(name)?.f64()?.get(row).unwrap_or(0.0))
}

fn totals_at(df: &DataFrame, row: usize) -> Result<VisitTotals, NetRateError> {
    Ok(VisitTotals {
        visit_count: df.column("visit_count")?.i64()?.get(row).unwrap_or(0),
        total_net_revenue: float_at(df, "total_net_revenue", row)?,
        total_units: float_at(df, "total_units", row)?,
        total_copay_collected: float_at(df, "total_copay_collected", row)?,
        total_copay_expected: float_at(df, "total_copay_expected", row)?,
        total_writeoffs: float_at(df, "total_writeoffs", row)?,
    })
}

/// Aggregates the visits of `period`, optionally restricted to one region.
pub fn aggregate(
    ledger: &DataFrame,
    period: &Period,
    region: Option<&str>,
) -> Result<MetricSnapshot, NetRateError> {
    let mut columns = vec![VISIT_DATE];
    columns.extend(AMOUNT_COLUMNS);
    if region.is_some() {
        columns.push(REGION_ID);
    }
    require_columns(ledger, &columns)?;

    let mut filter = period_filter(period);
    if let Some(region) = region {
        filter = filter.and(id_filter(REGION_ID, region));
    }

    let totals_df = ledger
        .clone()
        .lazy()
        .filter(filter)
        .select(total_exprs())
        .collect()?;
    let totals = if totals_df.height() == 0 {
        VisitTotals::default()
    } else {
        totals_at(&totals_df, 0)?
    };

    info!(
        period = %period,
        region = region.unwrap_or("all"),
        visits = totals.visit_count,
        "aggregated visit ledger"
    );
    Ok(MetricSnapshot::from(totals))
}

/// Aggregates both periods and decomposes the change between them.
pub fn region_waterfall(
    ledger: &DataFrame,
    prior: &Period,
    current: &Period,
    region: Option<&str>,
    engine: &VarianceEngine,
) -> Result<DecompositionResult, NetRateError> {
    let start = aggregate(ledger, prior, region)?;
    let end = aggregate(ledger, current, region)?;
    Ok(engine.decompose(&start, &end))
}

/// Organizational level for drill-down comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillLevel {
    Region,
    Market,
    Clinic,
    Therapist,
}

impl DrillLevel {
    pub fn id_column(&self) -> &'static str {
        match self {
            DrillLevel::Region => "region_id",
            DrillLevel::Market => "market_id",
            DrillLevel::Clinic => "clinic_id",
            DrillLevel::Therapist => "therapist_id",
        }
    }

    pub fn name_column(&self) -> &'static str {
        match self {
            DrillLevel::Region => "region_name",
            DrillLevel::Market => "market_name",
            DrillLevel::Clinic => "clinic_name",
            DrillLevel::Therapist => "therapist_name",
        }
    }

    /// Column holding the id of the enclosing entity, if the level has one.
    pub fn parent_column(&self) -> Option<&'static str> {
        match self {
            DrillLevel::Region => None,
            DrillLevel::Market => Some("region_id"),
            DrillLevel::Clinic => Some("market_id"),
            DrillLevel::Therapist => Some("clinic_id"),
        }
    }
}

impl FromStr for DrillLevel {
    type Err = NetRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "region" => Ok(DrillLevel::Region),
            "market" => Ok(DrillLevel::Market),
            "clinic" => Ok(DrillLevel::Clinic),
            "therapist" => Ok(DrillLevel::Therapist),
            _ => Err(NetRateError::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for DrillLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DrillLevel::Region => "region",
            DrillLevel::Market => "market",
            DrillLevel::Clinic => "clinic",
            DrillLevel::Therapist => "therapist",
        };
        write!(f, "{}", name)
    }
}

/// Current and prior period metrics for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityComparison {
    pub id: String,
    pub name: String,
    pub current: MetricSnapshot,
    pub prior: MetricSnapshot,
}

impl EntityComparison {
    /// Decomposes the change from the prior to the current period.
    pub fn decompose(&self, engine: &VarianceEngine) -> DecompositionResult {
        engine.decompose(&self.prior, &self.current)
    }
}

/// Decomposes every row in parallel, preserving order.
pub fn decompose_all(
    rows: &[EntityComparison],
    engine: &VarianceEngine,
) -> Vec<DecompositionResult> {
    rows.par_iter().map(|row| row.decompose(engine)).collect()
}

struct EntityTotals {
    id: String,
    name: String,
    totals: VisitTotals,
}

fn entity_totals(
    ledger: &DataFrame,
    level: DrillLevel,
    parent: Option<&str>,
    period: &Period,
) -> Result<Vec<EntityTotals>, NetRateError> {
    let mut filter = period_filter(period);
    if let (Some(parent_col), Some(parent)) = (level.parent_column(), parent) {
        filter = filter.and(id_filter(parent_col, parent));
    }

    let grouped = ledger
        .clone()
        .lazy()
        .filter(filter)
        .group_by([
            col(level.id_column())
                .cast(DataType::String)
                .alias("entity_id"),
            col(level.name_column())
                .cast(DataType::String)
                .alias("entity_name"),
        ])
        .agg(total_exprs())
        .collect()?;

    let ids = grouped.column("entity_id")?.str()?;
    let names = grouped.column("entity_name")?.str()?;
    let mut rows = Vec::with_capacity(grouped.height());
    for i in 0..grouped.height() {
        let Some(id) = ids.get(i) else {
            continue;
        };
        rows.push(EntityTotals {
            id: id.to_string(),
            name: names.get(i).unwrap_or("").to_string(),
            totals: totals_at(&grouped, i)?,
        });
    }
    Ok(rows)
}

/// Compares every entity at `level` that had visits in `current` with its
/// own metrics in `prior`.
///
/// Entities with no prior visits get an empty prior snapshot. Rows are
/// ordered by current net revenue, largest first.
pub fn drill_down(
    ledger: &DataFrame,
    level: DrillLevel,
    parent: Option<&str>,
    prior: &Period,
    current: &Period,
) -> Result<Vec<EntityComparison>, NetRateError> {
    let parent = match (level.parent_column(), parent) {
        (Some(_), None) => {
            return Err(NetRateError::MissingParent(format!(
                "{} drill-down needs a parent id",
                level
            )))
        }
        (None, _) => None,
        (Some(_), parent) => parent,
    };

    let mut columns = vec![VISIT_DATE, level.id_column(), level.name_column()];
    columns.extend(AMOUNT_COLUMNS);
    if let Some(parent_col) = level.parent_column() {
        columns.push(parent_col);
    }
    require_columns(ledger, &columns)?;

    let prior_by_id: HashMap<String, VisitTotals> = entity_totals(ledger, level, parent, prior)?
        .into_iter()
        .map(|row| (row.id, row.totals))
        .collect();

    let mut comparisons: Vec<EntityComparison> = entity_totals(ledger, level, parent, current)?
        .into_iter()
        .map(|row| {
            let prior = prior_by_id
                .get(&row.id)
                .copied()
                .map(MetricSnapshot::from)
                .unwrap_or_else(MetricSnapshot::empty);
            EntityComparison {
                id: row.id,
                name: row.name,
                current: MetricSnapshot::from(row.totals),
                prior,
            }
        })
        .collect();

    comparisons.sort_by(|a, b| {
        b.current
            .total_net_revenue
            .partial_cmp(&a.current.total_net_revenue)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    info!(
        level = %level,
        parent = parent.unwrap_or("-"),
        rows = comparisons.len(),
        "drill-down complete"
    );
    Ok(comparisons)
}
