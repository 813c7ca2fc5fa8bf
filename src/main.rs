//! Wellbeing Dashboard - student wellbeing survey overview
//!
//! A CLI tool that loads per-school, per-year survey means from a CSV
//! file and renders school comparisons, trends and threshold alerts as a
//! Markdown or JSON dashboard.
//!
//! Exit codes:
//!   0 - Success (no alert triggered, or no --fail-on-alert set)
//!   1 - Runtime error (unreadable data, bad config, unknown school, etc.)
//!   2 - An alert triggered and --fail-on-alert was set

mod analysis;
mod cli;
mod config;
mod dataset;
mod models;
mod report;

use anyhow::{anyhow, bail, Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use dataset::Dataset;
use report::dashboard::AlertSection;
use report::{DashboardSettings, Selection, SelectionOptions};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        if let Err(e) = handle_init_config() {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    // Initialize logging
    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    info!("Wellbeing Dashboard v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Dashboard failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .wellbeing.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        bail!(
            "{} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the data path, report metrics and alert rules.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Build and write the dashboard. Returns exit code (0 or 2).
fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    // Step 1: Load the survey data
    info!("Loading survey data: {}", config.data.path.display());
    let dataset = Dataset::load(&config.data.path)?;
    if dataset.is_empty() {
        bail!("No usable rows in {}", config.data.path.display());
    }
    info!(
        "Loaded {} rows, {} schools, {} years",
        dataset.len(),
        dataset.schools().len(),
        dataset.years().len()
    );

    // Handle --list: print the selection options and exit
    if args.list {
        let options = SelectionOptions::from_dataset(&dataset);
        print!(
            "{}",
            report::generate_options_listing(&options, dataset.schema())
        );
        return Ok(0);
    }

    // Step 2: Resolve the selection
    let selection = Selection::resolve(
        &dataset,
        args.view,
        args.school.as_deref(),
        args.years.as_deref(),
    )?;
    debug!("Selection: {:?}", selection);

    // Step 3: Build the dashboard
    let settings = DashboardSettings::from(&config);
    let dashboard = report::build_dashboard(&dataset, &selection, &settings);

    // Step 4: Render and write it
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&dashboard)?,
        OutputFormat::Markdown => report::generate_markdown_report(&dashboard),
    };

    if args.stdout {
        print!("{}", output);
    } else {
        let path = &config.general.output;
        std::fs::write(path, &output)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;

        if !args.quiet {
            println!("\n📊 Dashboard Summary:");
            println!("   View: {}", selection.view);
            if let Some(ref school) = dashboard.selection.school {
                println!("   School: {}", school);
            }
            println!("   Years: {}", join_years(&dashboard.selection.years));
            println!("   Alerts triggered: {}", describe_alerts(&dashboard));
            if !dashboard.warnings.is_empty() {
                println!("   Warnings: {}", dashboard.warnings.len());
            }
            println!("   Duration: {:.2}s", start_time.elapsed().as_secs_f64());
            println!("\n✅ Dashboard saved to: {}", path.display());
        }
    }

    // Check --fail-on-alert
    if args.fail_on_alert && dashboard.alerts.any_triggered() {
        eprintln!("\n⛔ Alerts triggered for the current selection. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

fn describe_alerts(dashboard: &report::Dashboard) -> String {
    match &dashboard.alerts {
        AlertSection::Evaluated(eval) => {
            let ids = eval.triggered_ids();
            if ids.is_empty() {
                "none".to_string()
            } else {
                ids.into_iter().collect::<Vec<_>>().join(", ")
            }
        }
        AlertSection::Unavailable { .. } => "unavailable (missing columns)".to_string(),
    }
}

fn join_years(years: &[i32]) -> String {
    years
        .iter()
        .map(|y| y.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
