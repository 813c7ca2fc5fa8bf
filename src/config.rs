//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.wellbeing.toml` files.

use crate::analysis::{AlertMode, DEFAULT_MIN_SHARE};
use crate::models::{AlertModeKind, AlertRule, Metric};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".wellbeing.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input data settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Alert settings.
    #[serde(default)]
    pub alerts: AlertsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("wellbeing_report.md")
}

/// Input data settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path of the survey CSV file.
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("lidanargogn_sudurnes_gervi.csv")
}

/// Report content settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Metric shown in the school comparison heatmap.
    #[serde(default = "default_metric")]
    pub heatmap_metric: Metric,

    /// Metric plotted in the single-school trend.
    #[serde(default = "default_metric")]
    pub trend_metric: Metric,

    /// Number of strengths and challenges listed per school.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Decimal places for means in tables.
    #[serde(default = "default_decimals")]
    pub decimals: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            heatmap_metric: default_metric(),
            trend_metric: default_metric(),
            top_n: default_top_n(),
            decimals: default_decimals(),
        }
    }
}

fn default_metric() -> Metric {
    Metric::Wellbeing
}

fn default_top_n() -> usize {
    3
}

fn default_decimals() -> usize {
    2
}

/// Alert rule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// How rules trigger: on any qualifying row, or on a share of rows.
    #[serde(default = "default_alert_mode")]
    pub mode: AlertModeKind,

    /// Share of rows that must qualify in proportion mode.
    #[serde(default = "default_min_share")]
    pub min_share: f64,

    /// Threshold rules.
    #[serde(default = "AlertRule::defaults")]
    pub rules: Vec<AlertRule>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            mode: default_alert_mode(),
            min_share: default_min_share(),
            rules: AlertRule::defaults(),
        }
    }
}

fn default_alert_mode() -> AlertModeKind {
    AlertModeKind::Proportion
}

fn default_min_share() -> f64 {
    DEFAULT_MIN_SHARE
}

impl AlertsConfig {
    /// The effective alert mode.
    pub fn mode(&self) -> AlertMode {
        AlertMode::from_kind(self.mode, self.min_share)
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values given explicitly on the command line override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data) = args.data {
            self.data.path = data.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = output.clone();
        }

        if let Some(metric) = args.metric {
            self.report.heatmap_metric = metric;
        }
        if let Some(metric) = args.trend_metric {
            self.report.trend_metric = metric;
        }
        if let Some(top_n) = args.top_n {
            self.report.top_n = top_n;
        }

        if let Some(mode) = args.alert_mode {
            self.alerts.mode = mode;
        }
        if let Some(min_share) = args.min_share {
            self.alerts.min_share = min_share;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values the serde defaults cannot guard.
    pub fn validate(&self) -> Result<()> {
        if self.report.top_n == 0 || self.report.top_n > Metric::COUNT {
            bail!(
                "report.top_n must be between 1 and {}, got {}",
                Metric::COUNT,
                self.report.top_n
            );
        }
        if !(self.alerts.min_share > 0.0 && self.alerts.min_share <= 1.0) {
            bail!(
                "alerts.min_share must be in (0, 1], got {}",
                self.alerts.min_share
            );
        }
        for rule in &self.alerts.rules {
            if rule.id.trim().is_empty() {
                bail!("alert rules need a non-empty id");
            }
            if !rule.threshold.is_finite() {
                bail!("alert rule '{}' has a non-finite threshold", rule.id);
            }
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
