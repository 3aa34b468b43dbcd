use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use netrate_waterfall::ledger::{self, decompose_all};
use netrate_waterfall::{
    resolve_periods, DecompositionConfig, DrillLevel, Driver, VarianceEngine, ViewType,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    waterfall_args: WaterfallArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decompose the net rate change for one period pair (the default)
    Waterfall(WaterfallArgs),
    /// Compare entities at one organizational level for a single driver
    DrillDown(DrillDownArgs),
}

#[derive(Parser, Debug)]
struct PeriodArgs {
    /// Comparison view [choices: MTD, QTD, YTD]
    #[arg(long, default_value = "MTD")]
    view_type: String,

    /// Last month of the comparison period (1-12)
    #[arg(long, default_value_t = 11)]
    month: u32,

    /// Year of the comparison period
    #[arg(long, default_value_t = 2025)]
    year: i32,
}

#[derive(Parser, Debug)]
struct WaterfallArgs {
    /// Path to the visit ledger CSV file
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[command(flatten)]
    period: PeriodArgs,

    /// Restrict the analysis to one region id
    #[arg(long)]
    region: Option<String>,

    /// Dollar value of one billed unit per visit
    #[arg(long)]
    unit_value: Option<f64>,

    /// Path to export results as JSON
    #[arg(long)]
    output_json: Option<PathBuf>,

    /// Path to export results as Markdown
    #[arg(long)]
    output_markdown: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct DrillDownArgs {
    /// Path to the visit ledger CSV file
    #[arg(short, long)]
    data: PathBuf,

    /// Driver to report per entity (e.g. payer_mix, copay_leakage)
    #[arg(long)]
    driver: String,

    /// Organizational level [choices: region, market, clinic, therapist]
    #[arg(long, default_value = "region")]
    level: String,

    /// Id of the enclosing entity (required below region level)
    #[arg(long)]
    parent_id: Option<String>,

    #[command(flatten)]
    period: PeriodArgs,

    /// Path to export rows as JSON
    #[arg(long)]
    output_json: Option<PathBuf>,
}

#[derive(Serialize)]
struct DrillDownRow {
    id: String,
    name: String,
    prior_visits: i64,
    current_visits: i64,
    prior_net_rate: f64,
    current_net_rate: f64,
    total_change: f64,
    driver: Driver,
    driver_impact: f64,
}

fn build_engine(unit_value: Option<f64>) -> Result<VarianceEngine> {
    let mut config = DecompositionConfig::default();
    if let Some(value) = unit_value {
        config.unit_value = value;
    }
    config.validate()?;
    Ok(VarianceEngine::with_config(config))
}

fn run_waterfall(args: WaterfallArgs) -> Result<()> {
    let data = args
        .data
        .ok_or_else(|| anyhow!("--data is required"))?;
    let view: ViewType = args.period.view_type.parse()?;
    let (prior, current) = resolve_periods(view, args.period.year, args.period.month)?;
    info!(%view, %prior, %current, "resolved periods");

    let engine = build_engine(args.unit_value)?;
    let visits = ledger::load_ledger(&data)
        .with_context(|| format!("Failed to load ledger from {}", data.display()))?;
    let result = ledger::region_waterfall(
        &visits,
        &prior,
        &current,
        args.region.as_deref(),
        &engine,
    )?;

    println!("Prior period:   {}", prior);
    println!("Current period: {}", current);
    if let Some(region) = &args.region {
        println!("Region: {}", region);
    }
    println!();
    result.summary();

    if let Some(path) = args.output_json {
        let json = result
            .to_json()
            .context("Failed to serialize to JSON")?;
        std::fs::write(path, json)?;
    }
    if let Some(path) = args.output_markdown {
        std::fs::write(path, result.to_markdown())?;
    }
    Ok(())
}

fn run_drill_down(args: DrillDownArgs) -> Result<()> {
    let driver: Driver = args.driver.parse()?;
    let level: DrillLevel = args.level.parse()?;
    let view: ViewType = args.period.view_type.parse()?;
    let (prior, current) = resolve_periods(view, args.period.year, args.period.month)?;

    let visits = ledger::load_ledger(&args.data)
        .with_context(|| format!("Failed to load ledger from {}", args.data.display()))?;
    let comparisons =
        ledger::drill_down(&visits, level, args.parent_id.as_deref(), &prior, &current)?;
    let engine = VarianceEngine::new();
    let results = decompose_all(&comparisons, &engine);

    let rows: Vec<DrillDownRow> = comparisons
        .iter()
        .zip(results.iter())
        .map(|(entity, result)| DrillDownRow {
            id: entity.id.clone(),
            name: entity.name.clone(),
            prior_visits: entity.prior.visit_count,
            current_visits: entity.current.visit_count,
            prior_net_rate: entity.prior.average_net_rate,
            current_net_rate: entity.current.average_net_rate,
            total_change: *result.total_change(),
            driver,
            driver_impact: result.drivers().get(driver),
        })
        .collect();

    println!("{} Drill-Down by {}", driver.label(), level);
    println!("Prior period:   {}", prior);
    println!("Current period: {}", current);
    let mut table = Table::new();
    table.set_header(vec![
        "Id",
        "Name",
        "Visits",
        "Prior Rate",
        "Current Rate",
        "Change",
        driver.label(),
    ]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(&row.id),
            Cell::new(&row.name),
            Cell::new(row.current_visits),
            Cell::new(format!("{:.2}", row.prior_net_rate)),
            Cell::new(format!("{:.2}", row.current_net_rate)),
            Cell::new(format!("{:+.4}", row.total_change)),
            Cell::new(format!("{:+.4}", row.driver_impact)),
        ]);
    }
    println!("{}", table);

    if let Some(path) = args.output_json {
        let json = serde_json::to_string_pretty(&rows)?;
        std::fs::write(path, json)?;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Waterfall(args)) => run_waterfall(args),
        Some(Commands::DrillDown(args)) => run_drill_down(args),
        None => run_waterfall(cli.waterfall_args),
    };
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
