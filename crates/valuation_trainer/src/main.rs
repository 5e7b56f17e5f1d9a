//! Carvault CLI
//!
//! Trains valuation models from CSV listings, explains individual vehicle
//! prices and inspects saved artifacts.

use anyhow::{Context, Result};
use carvault_core::artifact;
use carvault_core::serde_canon::to_canonical_json_pretty;
use carvault_core::{
    Explanation, ValuationConfig, ValuationPipeline, VehicleListing, VehicleRecord,
};
use carvault_trainer::{Dataset, ValuationTrainer};
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "carvault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explainable used-vehicle valuation", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model from a CSV dataset and write its artifact
    Train(TrainArgs),
    /// Predict and explain the price of one vehicle
    Explain(ExplainArgs),
    /// Verify an artifact and print its summary
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Input CSV dataset with a header row
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for the artifact (defaults to the configured one)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of trees
    #[arg(long)]
    trees: Option<usize>,

    /// Maximum tree depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Seed for bootstrap sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Year model years are subtracted from to get car ages
    #[arg(long)]
    reference_year: Option<i32>,

    /// Target column header
    #[arg(long)]
    target: Option<String>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("age_source").required(true).args(["age", "year"])))]
struct ExplainArgs {
    /// Artifact directory
    #[arg(short, long)]
    model: PathBuf,

    #[arg(long)]
    brand: String,

    #[arg(long)]
    model_name: String,

    #[arg(long)]
    fuel: String,

    #[arg(long)]
    transmission: String,

    /// Number of previous owners
    #[arg(long)]
    ownership: u32,

    /// Kilometres driven
    #[arg(long)]
    km: f64,

    /// Age in years
    #[arg(long)]
    age: Option<f64>,

    /// Model year, converted with the model's reference year
    #[arg(long)]
    year: Option<i32>,

    /// Fold one-hot columns back into their feature
    #[arg(long)]
    grouped: bool,

    /// Print canonical JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Artifact directory
    #[arg(short, long)]
    model: PathBuf,
}

#[derive(Serialize)]
struct ContributionLine {
    name: String,
    value: f64,
}

#[derive(Serialize)]
struct ExplainOutput {
    prediction: f64,
    baseline: f64,
    contributions: Vec<ContributionLine>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Train(args) => run_train(args),
        Command::Explain(args) => run_explain(args),
        Command::Inspect(args) => run_inspect(args),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let level = if verbose { Level::DEBUG } else { Level::INFO };
        tracing::subscriber::set_global_default(builder.with_max_level(level).finish())
    };

    installed.context("Failed to set tracing subscriber")
}

fn run_train(args: TrainArgs) -> Result<()> {
    info!("Carvault trainer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => ValuationConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ValuationConfig::default(),
    };
    config.load_from_env().context("Invalid environment override")?;

    if let Some(trees) = args.trees {
        config.forest.tree_count = trees;
    }
    if let Some(depth) = args.max_depth {
        config.forest.max_depth = Some(depth);
    }
    if let Some(seed) = args.seed {
        config.forest.seed = seed;
    }
    if let Some(year) = args.reference_year {
        config.reference_year = year;
    }
    if let Some(target) = args.target {
        config.target_column = target;
    }
    let output = args.output.unwrap_or_else(|| config.artifact_dir.clone());

    info!("Loading dataset from: {}", args.input.display());
    let dataset = Dataset::from_csv(&args.input, &config.target_column)
        .context("Failed to load dataset")?;
    let (lo, hi) = dataset.target_range();
    info!(
        "Loaded {} listings, target `{}` in [{}, {}]",
        dataset.len(),
        dataset.target_column,
        lo,
        hi
    );
    for (column, min, max) in dataset.feature_stats() {
        info!("  {}: min={}, max={}", column, min, max);
    }

    info!("Training configuration:");
    info!("  Trees: {}", config.forest.tree_count);
    match config.forest.max_depth {
        Some(depth) => info!("  Max depth: {}", depth),
        None => info!("  Max depth: unbounded"),
    }
    info!("  Min samples per leaf: {}", config.forest.min_samples_leaf);
    info!("  Seed: {}", config.forest.seed);
    info!("  Reference year: {}", config.reference_year);

    let report = ValuationTrainer::new(config).train_and_save(&dataset, &output)?;

    info!("Training completed");
    info!("  Trees: {}, encoded width: {}", report.trees, report.encoded_width);
    info!("  In-sample RMSE: {:.4}, R²: {:.4}", report.rmse, report.r_squared);
    info!("  Artifact: {} ({} bytes)", output.display(), report.bundle_size);
    info!("  Hash: {}", report.hash);
    Ok(())
}

fn run_explain(args: ExplainArgs) -> Result<()> {
    let pipeline = ValuationPipeline::load(&args.model)
        .with_context(|| format!("Failed to load model from {}", args.model.display()))?;

    let explanation = match (args.age, args.year) {
        (Some(car_age), _) => pipeline.explain_vehicle(&VehicleRecord {
            km_driven: args.km,
            fuel_type: args.fuel,
            transmission_type: args.transmission,
            ownership: args.ownership,
            brand: args.brand,
            model: args.model_name,
            car_age,
        })?,
        (None, Some(model_year)) => pipeline.explain_listing(VehicleListing {
            km_driven: args.km,
            fuel_type: args.fuel,
            transmission_type: args.transmission,
            ownership: args.ownership,
            brand: args.brand,
            model: args.model_name,
            model_year,
        })?,
        (None, None) => anyhow::bail!("either --age or --year is required"),
    };

    let output = explain_output(&explanation, args.grouped);
    if args.json {
        println!("{}", to_canonical_json_pretty(&output)?);
    } else {
        print_table(&output);
    }
    Ok(())
}

fn explain_output(explanation: &Explanation, grouped: bool) -> ExplainOutput {
    let attribution = &explanation.attribution;
    let mut contributions: Vec<ContributionLine> = if grouped {
        attribution
            .grouped()
            .into_iter()
            .map(|g| ContributionLine {
                name: g.feature,
                value: g.value,
            })
            .collect()
    } else {
        attribution
            .contributions
            .iter()
            .map(|c| ContributionLine {
                name: c.name.clone(),
                value: c.value,
            })
            .collect()
    };
    contributions.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));

    ExplainOutput {
        prediction: explanation.prediction,
        baseline: attribution.baseline,
        contributions,
    }
}

fn print_table(output: &ExplainOutput) {
    let width = output
        .contributions
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0)
        .max("baseline".len());

    println!("{:<width$}  {:>10.4}", "prediction", output.prediction);
    println!("{:<width$}  {:>10.4}", "baseline", output.baseline);
    println!("{}", "-".repeat(width + 12));
    for line in output.contributions.iter().filter(|c| c.value != 0.0) {
        println!("{:<width$}  {:>+10.4}", line.name, line.value);
    }
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let state = artifact::load(&args.model)
        .with_context(|| format!("Failed to load model from {}", args.model.display()))?;
    let summary = artifact::read_summary(&args.model).context("Failed to read artifact summary")?;
    info!(
        "Artifact verified: {} trees over {} encoded columns",
        state.forest().n_trees(),
        state.spec().encoded_width()
    );
    println!("{}", to_canonical_json_pretty(&summary)?);
    Ok(())
}
