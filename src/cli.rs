//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{AlertModeKind, Metric, ViewMode};
use clap::Parser;
use std::path::PathBuf;

/// Wellbeing Dashboard - student wellbeing survey overview
///
/// Loads a CSV of per-school, per-year survey means and renders school
/// comparisons, a heatmap, trends and alerts as Markdown or JSON.
///
/// Examples:
///   wellbeing-dashboard --data survey.csv
///   wellbeing-dashboard --data survey.csv --view single-school --school Akurskóli
///   wellbeing-dashboard --data survey.csv --years 2022,2023 --format json --stdout
///   wellbeing-dashboard --data survey.csv --list
///   wellbeing-dashboard --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Survey CSV file
    ///
    /// Needs school and year columns plus the metric columns. Falls back to
    /// the config file, then to lidanargogn_sudurnes_gervi.csv.
    #[arg(short, long, value_name = "FILE", env = "WELLBEING_DATA")]
    pub data: Option<PathBuf>,

    /// Which page to render
    #[arg(long, default_value = "comparison", value_name = "MODE")]
    pub view: ViewMode,

    /// School for the single-school view
    ///
    /// Defaults to the first school in alphabetical order.
    #[arg(short, long, value_name = "NAME")]
    pub school: Option<String>,

    /// Years to include (comma-separated, default: all)
    ///
    /// Example: --years 2022,2023
    #[arg(long, value_name = "YEARS", value_delimiter = ',')]
    pub years: Option<Vec<i32>>,

    /// Metric shown in the comparison heatmap
    #[arg(short, long, value_name = "METRIC")]
    pub metric: Option<Metric>,

    /// Metric plotted in the single-school trend
    #[arg(long, value_name = "METRIC")]
    pub trend_metric: Option<Metric>,

    /// Number of strengths and challenges to list
    #[arg(long, value_name = "N")]
    pub top_n: Option<usize>,

    /// How alert rules trigger
    ///
    /// existence: any qualifying row; proportion: share of rows >= --min-share
    #[arg(long, value_name = "MODE")]
    pub alert_mode: Option<AlertModeKind>,

    /// Share of rows that must qualify in proportion mode (0-1]
    #[arg(long, value_name = "SHARE")]
    pub min_share: Option<f64>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE", conflicts_with = "stdout")]
    pub output: Option<PathBuf>,

    /// Print the report to stdout instead of writing a file
    #[arg(long)]
    pub stdout: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .wellbeing.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List schools, years and available columns, then exit
    #[arg(long)]
    pub list: bool,

    /// Exit with code 2 when any alert triggers
    #[arg(long)]
    pub fail_on_alert: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .wellbeing.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(top_n) = self.top_n {
            if top_n == 0 || top_n > Metric::COUNT {
                return Err(format!("--top-n must be between 1 and {}", Metric::COUNT));
            }
        }

        if let Some(share) = self.min_share {
            if !(share > 0.0 && share <= 1.0) {
                return Err("--min-share must be greater than 0 and at most 1".to_string());
            }
        }

        if let Some(ref years) = self.years {
            if years.is_empty() {
                return Err("--years needs at least one year".to_string());
            }
        }

        if let Some(ref school) = self.school {
            if school.trim().is_empty() {
                return Err("--school cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
