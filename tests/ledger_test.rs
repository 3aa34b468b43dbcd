use netrate_waterfall::ledger::{self, aggregate, decompose_all, drill_down, load_ledger};
use netrate_waterfall::{
    resolve_periods, DrillLevel, Driver, NetRateError, Period, VarianceEngine, ViewType,
};
use polars::prelude::*;

fn visits() -> DataFrame {
    load_ledger("tests/data/visits.csv").expect("failed to load test ledger")
}

fn november() -> (Period, Period) {
    resolve_periods(ViewType::Mtd, 2025, 11).unwrap()
}

#[test]
fn test_aggregate_inclusive_period() {
    let (prior, current) = november();
    let df = visits();

    let october = aggregate(&df, &prior, None).unwrap();
    assert_eq!(october.visit_count, 4);
    assert!((october.total_net_revenue - 300.0).abs() < 1e-9);
    assert!((october.average_net_rate - 75.0).abs() < 1e-9);
    assert!((october.total_units - 9.0).abs() < 1e-9);
    assert!((october.total_copay_collected - 50.0).abs() < 1e-9);
    assert!((october.total_copay_expected - 80.0).abs() < 1e-9);
    assert!((october.total_writeoffs - 30.0).abs() < 1e-9);

    let nov = aggregate(&df, &current, None).unwrap();
    assert_eq!(nov.visit_count, 5);
    assert!((nov.average_net_rate - 85.0).abs() < 1e-9);
}

#[test]
fn test_aggregate_region_filter() {
    let (_, current) = november();
    let south = aggregate(&visits(), &current, Some("2")).unwrap();
    assert_eq!(south.visit_count, 2);
    assert!((south.total_net_revenue - 145.0).abs() < 1e-9);
    assert!((south.average_net_rate - 72.5).abs() < 1e-9);
}

#[test]
fn test_aggregate_empty_period() {
    let (prior, _) = resolve_periods(ViewType::Mtd, 2024, 3).unwrap();
    let snapshot = aggregate(&visits(), &prior, None).unwrap();
    assert_eq!(snapshot.visit_count, 0);
    assert_eq!(snapshot.average_net_rate, 0.0);
    assert_eq!(snapshot.total_net_revenue, 0.0);
}

#[test]
fn test_region_waterfall_from_ledger() {
    let (prior, current) = november();
    let result =
        ledger::region_waterfall(&visits(), &prior, &current, None, &VarianceEngine::new())
            .unwrap();

    assert!((result.total_change() - 10.0).abs() < 1e-9);
    let drivers = result.drivers();
    assert!((drivers.units_per_visit - 8.75).abs() < 1e-9);
    assert!((drivers.copay_leakage + 6.5).abs() < 1e-9);
    assert!((drivers.writeoffs_denials + 5.5).abs() < 1e-9);
    assert!((drivers.payer_mix - 0.35 * 13.25).abs() < 1e-9);
    assert!((result.driver_sum() - 10.0).abs() < 1e-6);
}

#[test]
fn test_nulls_count_as_zero() -> Result<(), Box<dyn std::error::Error>> {
    let df = df!(
        "visit_date" => &["2025-03-03", "2025-03-04"],
        "region_id" => &[1i64, 1],
        "net_revenue" => &[Some(100.0), Some(60.0)],
        "total_units" => &[Some(2.0), None],
        "copay_collected" => &[Some(10.0), None],
        "copay_expected" => &[Some(20.0), Some(20.0)],
        "write_off_amount" => &[None::<f64>, None]
    )?;
    let period = Period::month_of(chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())?;
    let snapshot = aggregate(&df, &period, Some("1"))?;

    assert_eq!(snapshot.visit_count, 2);
    assert!((snapshot.average_net_rate - 80.0).abs() < 1e-9);
    assert!((snapshot.total_units - 2.0).abs() < 1e-9);
    assert!((snapshot.total_copay_collected - 10.0).abs() < 1e-9);
    assert_eq!(snapshot.total_writeoffs, 0.0);
    Ok(())
}

#[test]
fn test_drill_down_regions() {
    let (prior, current) = november();
    let rows = drill_down(&visits(), DrillLevel::Region, None, &prior, &current).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "1");
    assert_eq!(rows[0].name, "North");
    assert_eq!(rows[0].current.visit_count, 3);
    assert_eq!(rows[0].prior.visit_count, 2);
    assert!((rows[0].prior.average_net_rate - 85.0).abs() < 1e-9);
    assert_eq!(rows[1].id, "2");
    assert!((rows[1].current.average_net_rate - 72.5).abs() < 1e-9);
    assert!((rows[1].prior.average_net_rate - 65.0).abs() < 1e-9);
}

#[test]
fn test_drill_down_therapists_without_prior_visits() {
    let (prior, current) = november();
    let rows = drill_down(&visits(), DrillLevel::Therapist, Some("100"), &prior, &current).unwrap();

    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1000", "1001", "1002"]);
    let newcomer = &rows[2];
    assert_eq!(newcomer.name, "Riley Chen");
    assert_eq!(newcomer.prior.visit_count, 0);
    assert_eq!(newcomer.prior.average_net_rate, 0.0);

    let results = decompose_all(&rows, &VarianceEngine::new());
    assert_eq!(results.len(), 3);
    assert!((results[2].total_change() - 85.0).abs() < 1e-9);
    for result in &results {
        assert!((result.driver_sum() - result.total_change()).abs() < 1e-6);
    }
}

#[test]
fn test_drill_down_markets_filtered_by_parent() {
    let (prior, current) = november();
    let rows = drill_down(&visits(), DrillLevel::Market, Some("2"), &prior, &current).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Bayside");

    let row = rows[0].decompose(&VarianceEngine::new());
    assert!((row.total_change() - 7.5).abs() < 1e-9);
    assert!(row.drivers().get(Driver::PayerMix).is_finite());
}

#[test]
fn test_drill_down_requires_parent() {
    let (prior, current) = november();
    let err = drill_down(&visits(), DrillLevel::Clinic, None, &prior, &current).unwrap_err();
    assert!(matches!(err, NetRateError::MissingParent(_)));
}

#[test]
fn test_missing_ledger_file() {
    let err = load_ledger("tests/data/does_not_exist.csv").unwrap_err();
    assert!(matches!(err, NetRateError::Io(_)));
}
