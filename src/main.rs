//! Ratesweep main entry point
//!
//! Command-line interface for the session-resilient hotel availability
//! sweeper.

use chrono::{Duration, Local, NaiveDate};
use clap::Parser;
use ratesweep::config::{load_config, Settings, SweepPriority};
use ratesweep::orchestrator::run_sweeps;
use ratesweep::sweep::{generate_sweeps, parse_date_expr, resolve_destinations, DateSweep};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default lead time for the single sweep used when neither a date range
/// nor a check-in is configured
const DEFAULT_CHECK_IN_OFFSET_DAYS: i64 = 14;

/// Ratesweep: a session-resilient hotel availability sweeper
///
/// Drives a matrix of (destination x check-in date) searches against a
/// travel backend and persists normalized results with resumability.
#[derive(Parser, Debug)]
#[command(name = "ratesweep")]
#[command(version = "1.0.0")]
#[command(about = "A session-resilient hotel availability sweeper", long_about = None)]
struct Cli {
    /// Path to TOML run configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Override the check-in date (ISO date or relative, e.g. "+14d")
    #[arg(long, value_name = "DATE")]
    check_in: Option<String>,

    /// Override the stay length in nights
    #[arg(long)]
    nights: Option<u32>,

    /// Override the destination selection (comma-separated keys/groups)
    #[arg(long, value_delimiter = ',', value_name = "KEYS")]
    destinations: Option<Vec<String>>,

    /// Override the sweep ordering: sweep-first or destination-first
    #[arg(long, value_name = "POLICY")]
    priority: Option<String>,

    /// Skip units whose latest run is complete (default behavior)
    #[arg(long, conflicts_with = "no_resume")]
    resume: bool,

    /// Re-run every unit even when a complete run exists
    #[arg(long, conflicts_with = "resume")]
    no_resume: bool,

    /// Override the SQLite database path
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Validate config and show what would be swept without running
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut settings = match load_config(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Loaded run profile '{}'", settings.profile);

    apply_overrides(&mut settings, &cli)?;

    let sweeps = build_sweeps(&settings)?;
    if sweeps.len() > 1 {
        tracing::info!(
            "Date range configured with {} iterations (start {})",
            sweeps.len(),
            sweeps[0].check_in
        );
    }

    if cli.dry_run {
        return handle_dry_run(&settings, &sweeps);
    }

    match run_sweeps(&settings, sweeps).await {
        Ok(()) => {
            tracing::info!("Sweep completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Sweep failed: {}", e);
            Err(e.into())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ratesweep=info,warn"),
            1 => EnvFilter::new("ratesweep=debug,info"),
            2 => EnvFilter::new("ratesweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies the enumerated CLI overrides onto the loaded settings
fn apply_overrides(settings: &mut Settings, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(check_in) = &cli.check_in {
        parse_date_expr(check_in)?;
        settings.search.check_in = Some(check_in.clone());
        settings.date_range = None;
        tracing::info!("Override: check-in = {}", check_in);
    }
    if let Some(nights) = cli.nights {
        if nights < 1 {
            return Err("--nights must be >= 1".into());
        }
        settings.search.nights = nights;
        tracing::info!("Override: nights = {}", nights);
    }
    if let Some(destinations) = &cli.destinations {
        settings.search.destinations = destinations.clone();
        tracing::info!("Override: destinations = {}", destinations.join(", "));
    }
    if let Some(priority) = &cli.priority {
        settings.sweep.priority = match priority.as_str() {
            "sweep-first" => SweepPriority::SweepFirst,
            "destination-first" => SweepPriority::DestinationFirst,
            other => {
                return Err(format!(
                    "unknown --priority '{other}' (expected sweep-first or destination-first)"
                )
                .into())
            }
        };
        tracing::info!("Override: priority = {}", priority);
    }
    if cli.resume {
        settings.sweep.resume_completed = true;
        tracing::info!("Override: resume enabled");
    } else if cli.no_resume {
        settings.sweep.resume_completed = false;
        tracing::info!("Override: resume disabled");
    }
    if let Some(database) = &cli.database {
        settings.storage.database_path = database.clone();
        tracing::info!("Override: database = {}", database);
    }
    Ok(())
}

/// Builds the sweep series: the configured date range, a single configured
/// check-in, or a default two weeks out
fn build_sweeps(settings: &Settings) -> Result<Vec<DateSweep>, Box<dyn std::error::Error>> {
    let today: NaiveDate = Local::now().date_naive();

    if let Some(range) = &settings.date_range {
        let sweeps = generate_sweeps(range, today)?;
        if !sweeps.is_empty() {
            return Ok(sweeps);
        }
    }

    let check_in = match &settings.search.check_in {
        Some(expr) => parse_date_expr(expr)?.resolve(today),
        None => today + Duration::days(DEFAULT_CHECK_IN_OFFSET_DAYS),
    };
    Ok(vec![DateSweep::new(check_in)])
}

/// Handles the --dry-run mode: validates the plan and prints it
fn handle_dry_run(
    settings: &Settings,
    sweeps: &[DateSweep],
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Ratesweep Dry Run ===\n");

    println!("Profile: {}", settings.profile);
    println!("Priority: {:?}", settings.sweep.priority);
    println!("Resume completed runs: {}", settings.sweep.resume_completed);
    println!(
        "Backend failure threshold: {}",
        settings.sweep.max_consecutive_backend_failures
    );
    println!("Database: {}", settings.storage.database_path);

    let destinations = resolve_destinations(settings)?;
    println!("\nDestinations ({}):", destinations.len());
    for destination in &destinations {
        println!(
            "  - {} ({}, {})",
            destination.key, destination.group, destination.name
        );
    }

    println!("\nSweeps ({}):", sweeps.len());
    for sweep in sweeps {
        let nights = sweep.nights.unwrap_or(settings.search.nights);
        println!("  - {} ({} nights)", sweep.label_text(), nights);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would execute {} search units",
        destinations.len() * sweeps.len()
    );

    Ok(())
}
