//! mdgl-dg (Dataset Generator) - Main entry point
//!
//! Generates a per-patient ICU time series dataset from a clinical store
//! according to a specification catalog.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mdgl_common::config::{
    load_config, resolve_database_path, ConfigSource, LoggingConfig, TomlConfig,
};
use mdgl_common::db::init_database;
use mdgl_common::SpecificationCatalog;
use mdgl_dg::{generate_dataset, rebuild_report, RunOptions};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for mdgl-dg
#[derive(Parser, Debug)]
#[command(name = "mdgl-dg")]
#[command(about = "ICU cohort time series dataset generator")]
#[command(version)]
struct Args {
    /// Bootstrap config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Clinical SQLite store
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Specification catalog (TOML)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Directory under which the dataset folder is created
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Number of concurrent workers (default: hardware parallelism)
    #[arg(short = 'j', long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a dataset (default)
    Run,
    /// Load and validate the catalog, then exit
    Validate,
    /// Create an empty clinical store with the expected tables
    InitDb,
    /// Recompute the statistics report of an existing dataset directory
    Report {
        /// Dataset directory holding the patient CSV files
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, source) =
        load_config(args.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.logging)?;
    match &source {
        ConfigSource::File(path) => info!("Config loaded from {}", path.display()),
        ConfigSource::Defaults {
            looked_at: Some(path),
        } => warn!("No config file at {}; using built-in defaults", path.display()),
        ConfigSource::Defaults { looked_at: None } => {
            warn!("Could not determine config directory; using built-in defaults")
        }
    }

    info!(
        "Starting mdgl-dg v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let result = match args.command.as_ref().unwrap_or(&Command::Run) {
        Command::Run => run(&args, &config).await,
        Command::Validate => validate(&args, &config),
        Command::InitDb => init_db(&args, &config).await,
        Command::Report { dir } => report(&args, &config, dir),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn run(args: &Args, config: &TomlConfig) -> Result<()> {
    let (catalog, catalog_path) = load_catalog(args, config)?;

    let options = RunOptions {
        database_path: resolve_database_path(args.database.as_deref(), config),
        output_root: args
            .output
            .clone()
            .unwrap_or_else(|| config.output_root.clone()),
        catalog_path: Some(catalog_path),
        concurrency: args.concurrency.or(config.concurrency),
    };
    info!("Database path: {}", options.database_path.display());

    let summary = generate_dataset(&catalog, &options)
        .await
        .context("Dataset generation failed")?;

    let failed = summary.enrichment.failed_partitions
        + summary.extraction.failed_partitions
        + summary.normalization.failed_partitions;
    if failed > 0 {
        error!(
            failed_partitions = failed,
            "Dataset is incomplete; see run_summary.json"
        );
    }
    Ok(())
}

fn validate(args: &Args, config: &TomlConfig) -> Result<()> {
    let (catalog, path) = load_catalog(args, config)?;
    let filter = catalog.filter();
    info!(
        icu_types = ?filter.icu_types,
        age_min = filter.age_min,
        age_max = filter.age_max,
        sex = ?filter.sex,
        horizon = ?filter.horizon,
        parameters = catalog.parameters().len(),
        measurement_ids = catalog.measurement_ids().len(),
        "✓ Catalog {} is valid",
        path.display()
    );
    Ok(())
}

async fn init_db(args: &Args, config: &TomlConfig) -> Result<()> {
    let path = resolve_database_path(args.database.as_deref(), config);
    init_database(&path)
        .await
        .with_context(|| format!("Failed to initialize {}", path.display()))?;
    info!("✓ Clinical store ready at {}", path.display());
    Ok(())
}

fn report(args: &Args, config: &TomlConfig, dir: &std::path::Path) -> Result<()> {
    let (catalog, _) = load_catalog(args, config)?;
    rebuild_report(&catalog, dir)
        .with_context(|| format!("Failed to rebuild report in {}", dir.display()))?;
    Ok(())
}

/// Catalog path from the CLI, else from the config file
fn load_catalog(args: &Args, config: &TomlConfig) -> Result<(SpecificationCatalog, PathBuf)> {
    let path = args
        .catalog
        .clone()
        .or_else(|| config.catalog_path.clone())
        .ok_or_else(|| anyhow!("No catalog given: pass --catalog or set catalog_path"))?;
    let catalog = SpecificationCatalog::from_file(&path)
        .with_context(|| format!("Invalid catalog {}", path.display()))?;
    Ok((catalog, path))
}

/// Stderr logging, plus an append-only log file when configured.
/// `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level {:?}", logging.level))?;
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}
