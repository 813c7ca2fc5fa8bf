//! Markdown and JSON rendering.
//!
//! This module renders a [`Dashboard`] as a Markdown page or as pretty
//! printed JSON.

use super::dashboard::{
    AlertSection, ComparisonView, Dashboard, DashboardMetadata, DashboardView, SchoolView,
    SelectionOptions, SelectionSummary,
};
use crate::analysis::{AlertEvaluation, AlertMode, HeatmapMatrix, MetricMean};
use crate::dataset::DatasetSchema;
use crate::models::{Metric, Period, ViewMode};
use anyhow::Result;
use std::collections::BTreeMap;

/// Placeholder for cells without data.
const EMPTY_CELL: &str = "-";

/// Generate a complete Markdown dashboard page.
pub fn generate_markdown_report(dashboard: &Dashboard) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Student Wellbeing Dashboard\n\n");

    output.push_str(&generate_metadata_section(&dashboard.metadata));
    output.push_str(&generate_selection_section(
        &dashboard.selection,
        &dashboard.options,
    ));

    let metrics = &dashboard.metadata.available_metrics;
    match &dashboard.view {
        DashboardView::Comparison(view) => {
            output.push_str(&generate_comparison_section(view, metrics, dashboard.decimals));
        }
        DashboardView::SingleSchool(view) => {
            output.push_str(&generate_school_section(view, metrics, dashboard.decimals));
        }
    }

    output.push_str(&generate_alerts_section(&dashboard.alerts));
    output.push_str(&generate_warnings_section(&dashboard.warnings));

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate a JSON dashboard.
pub fn generate_json_report(dashboard: &Dashboard) -> Result<String> {
    serde_json::to_string_pretty(dashboard).map_err(Into::into)
}

/// Plain-text listing of the selection options and column availability.
pub fn generate_options_listing(options: &SelectionOptions, schema: &DatasetSchema) -> String {
    let mut listing = String::new();

    listing.push_str("Schools:\n");
    for school in &options.schools {
        listing.push_str(&format!("  {}\n", school));
    }

    listing.push_str("Years:\n");
    for year in &options.years {
        listing.push_str(&format!("  {} ({})\n", year.year, year.period));
    }

    listing.push_str("Views:\n");
    for view in &options.views {
        listing.push_str(&format!("  {}\n", view));
    }

    listing.push_str("Metrics:\n");
    for metric in Metric::ALL {
        let status = if schema.has_metric(metric) {
            "present"
        } else {
            "missing"
        };
        listing.push_str(&format!("  {:<22} {}\n", metric.key(), status));
    }

    listing.push_str(&format!(
        "Alerts: {}\n",
        if schema.has_alert_columns() {
            "available"
        } else {
            "unavailable (loneliness or anxiety column missing)"
        }
    ));

    listing
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &DashboardMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Data Source:** `{}`\n", metadata.data_source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Rows:** {}\n", metadata.rows));
    if !metadata.missing_metrics.is_empty() {
        section.push_str(&format!(
            "- **Missing Columns:** {}\n",
            join_metrics(&metadata.missing_metrics)
        ));
    }
    section.push('\n');

    section
}

/// Generate the selection section.
fn generate_selection_section(selection: &SelectionSummary, options: &SelectionOptions) -> String {
    let mut section = String::new();

    section.push_str("## Selection\n\n");
    let view_label = match selection.view {
        ViewMode::Comparison => "School comparison",
        ViewMode::SingleSchool => "Single school",
    };
    section.push_str(&format!("- **View:** {}\n", view_label));
    if let Some(ref school) = selection.school {
        section.push_str(&format!("- **School:** {}\n", school));
    }

    let years: Vec<String> = selection
        .years
        .iter()
        .map(|y| format!("{} ({})", y, Period::from_year(*y)))
        .collect();
    section.push_str(&format!("- **Years:** {}\n", years.join(", ")));
    section.push_str(&format!(
        "- **Available Schools:** {}\n\n",
        options.schools.join(", ")
    ));

    section
}

/// Generate the school comparison tables.
fn generate_comparison_section(
    view: &ComparisonView,
    metrics: &[Metric],
    decimals: usize,
) -> String {
    let mut section = String::new();

    section.push_str("## School Comparison\n\n");

    if view.school_means.is_empty() {
        section.push_str("No data for the selected years.\n\n");
    } else {
        section.push_str("*Means over the selected years.*\n\n");
        section.push_str(&table_header("School", metrics));
        for row in &view.school_means {
            section.push_str(&table_row(&row.school, &row.means, metrics, decimals));
        }
        section.push('\n');
    }

    if let Some(ref matrix) = view.heatmap {
        section.push_str(&generate_heatmap_section(matrix));
    }

    section
}

/// Generate the year × school heatmap table.
fn generate_heatmap_section(matrix: &HeatmapMatrix) -> String {
    let mut section = String::new();

    let years: Vec<String> = matrix.years.iter().map(|y| y.to_string()).collect();
    section.push_str(&format!(
        "### Heatmap: {} by Year ({})\n\n",
        matrix.metric,
        years.join(", ")
    ));
    section.push_str("| Year |");
    for school in &matrix.schools {
        section.push_str(&format!(" {} |", school));
    }
    section.push_str("\n|:---|");
    for _ in &matrix.schools {
        section.push_str(":---:|");
    }
    section.push('\n');

    for year in &matrix.years {
        section.push_str(&format!("| {} |", year));
        for school in &matrix.schools {
            section.push_str(&format!(" {} |", format_value(matrix.get(*year, school), 1)));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

/// Generate the single-school sections.
fn generate_school_section(view: &SchoolView, metrics: &[Metric], decimals: usize) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", view.school));

    // Yearly means
    section.push_str("### Yearly Means\n\n");
    if view.yearly_means.is_empty() {
        section.push_str("No data for the selected years.\n\n");
    } else {
        section.push_str(&table_header("Year", metrics));
        for yearly in &view.yearly_means {
            let label = format!("{} ({})", yearly.year, yearly.period);
            section.push_str(&table_row(&label, &yearly.means, metrics, decimals));
        }
        section.push('\n');
    }

    // Strengths and challenges
    if !view.strengths.is_empty() {
        section.push_str("### Strengths and Challenges\n\n");
        section.push_str(&format!(
            "**Strengths:** {}\n\n",
            format_ranked(&view.strengths, decimals)
        ));
        section.push_str(&format!(
            "**Challenges:** {}\n\n",
            format_ranked(&view.challenges, decimals)
        ));
    }

    // Baselines
    section.push_str("### Comparison with National and District Averages\n\n");
    section.push_str("| Metric | National | District |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for metric in metrics {
        let district = view.district.as_ref().and_then(|d| d.get(metric)).copied();
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            metric,
            format_value(view.national.get(metric).copied(), decimals),
            format_value(district, decimals),
        ));
    }
    section.push('\n');

    // Trend
    if let Some(school_series) = view.trend.first() {
        section.push_str(&format!("### Trend: {}\n\n", view.trend_metric));
        section.push_str("| Year |");
        for series in &view.trend {
            section.push_str(&format!(" {} ({}) |", series.label, series.style));
        }
        section.push_str("\n|:---|");
        for _ in &view.trend {
            section.push_str(":---:|");
        }
        section.push('\n');

        for (i, point) in school_series.points.iter().enumerate() {
            section.push_str(&format!("| {} |", point.year));
            for series in &view.trend {
                let value = series.points.get(i).map(|p| p.value);
                section.push_str(&format!(" {} |", format_value(value, decimals)));
            }
            section.push('\n');
        }
        section.push('\n');
    }

    section
}

/// Generate the alerts and recommendations section.
fn generate_alerts_section(alerts: &AlertSection) -> String {
    let mut section = String::new();

    section.push_str("## Alerts and Recommendations\n\n");

    match alerts {
        AlertSection::Unavailable { reason } => {
            section.push_str(&format!("> ⚠️ **Data unavailable:** {}\n\n", reason));
        }
        AlertSection::Evaluated(eval) => {
            section.push_str(&format!("*Trigger: {}*\n\n", describe_mode(eval)));

            if !eval.any_triggered() {
                section.push_str("No alerts triggered for the current selection. ✅\n\n");
            }
            for outcome in eval.triggered() {
                section.push_str(&format!(
                    "> 🔴 **Alert ({}):** {}\n>\n> 💡 **Recommendation:** {}\n\n",
                    outcome.rule_id, outcome.message, outcome.recommendation
                ));
            }

            section.push_str("| Rule | Condition | Rows | Share | Triggered |\n");
            section.push_str("|:---|:---|:---:|:---:|:---:|\n");
            for outcome in &eval.outcomes {
                section.push_str(&format!(
                    "| {} | {} {} {} | {}/{} | {:.0}% | {} |\n",
                    outcome.rule_id,
                    outcome.metric.key(),
                    outcome.op,
                    outcome.threshold,
                    outcome.qualifying_rows,
                    outcome.total_rows,
                    outcome.proportion * 100.0,
                    if outcome.triggered { "yes" } else { "no" }
                ));
            }
            section.push('\n');
        }
    }

    section
}

/// Generate the warnings section.
fn generate_warnings_section(warnings: &[String]) -> String {
    if warnings.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Warnings\n\n");
    for warning in warnings {
        section.push_str(&format!("- {}\n", warning));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Generated by wellbeing-dashboard from anonymised survey means*\n");

    footer
}

fn table_header(first: &str, metrics: &[Metric]) -> String {
    let mut header = format!("| {} |", first);
    for metric in metrics {
        header.push_str(&format!(" {} |", metric));
    }
    header.push_str("\n|:---|");
    for _ in metrics {
        header.push_str(":---:|");
    }
    header.push('\n');
    header
}

fn table_row(
    label: &str,
    means: &BTreeMap<Metric, f64>,
    metrics: &[Metric],
    decimals: usize,
) -> String {
    let mut row = format!("| {} |", label);
    for metric in metrics {
        row.push_str(&format!(
            " {} |",
            format_value(means.get(metric).copied(), decimals)
        ));
    }
    row.push('\n');
    row
}

fn format_value(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => EMPTY_CELL.to_string(),
    }
}

fn format_ranked(ranked: &[MetricMean], decimals: usize) -> String {
    ranked
        .iter()
        .map(|m| format!("{} ({:.*})", m.metric, decimals, m.mean))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_mode(eval: &AlertEvaluation) -> String {
    match eval.mode {
        AlertMode::Existence => "any row meeting a rule".to_string(),
        AlertMode::Proportion { min_share } => {
            format!("at least {:.0}% of rows meeting a rule", min_share * 100.0)
        }
    }
}

fn join_metrics(metrics: &[Metric]) -> String {
    metrics
        .iter()
        .map(|m| m.key())
        .collect::<Vec<_>>()
        .join(", ")
}
