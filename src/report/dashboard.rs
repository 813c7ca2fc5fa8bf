//! Dashboard page model.
//!
//! Turns a selection (view mode, school, years) into the tables, heatmap,
//! trend series and alerts of one dashboard page. Aggregation failures are
//! not fatal here: each one becomes a warning on the page and the section
//! that needed it is left out.

use crate::analysis::{
    comparison_baselines, evaluate_alerts, filter_rows, group_means, heatmap, national_average,
    top_and_bottom_n, trend, yearly_means, AlertEvaluation, AlertMode, AnalysisError,
    HeatmapMatrix, MetricMean, TrendPoint, YearlyMeans,
};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::models::{AlertRule, GroupKey, KeyValue, Metric, Observation, Period, ViewMode};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

/// What the user picked in the selection controls.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub view: ViewMode,
    pub school: String,
    pub years: BTreeSet<i32>,
}

impl Selection {
    /// Resolve the requested selection against the loaded data.
    ///
    /// Without a school the first one alphabetically is used. An unknown
    /// school is an error only in the single-school view. Without
    /// years every year in the data is used. Requested years that do not
    /// occur in the data are dropped with a warning.
    pub fn resolve(
        dataset: &Dataset,
        view: ViewMode,
        school: Option<&str>,
        years: Option<&[i32]>,
    ) -> Result<Self> {
        let schools = dataset.schools();
        let Some(first_school) = schools.first() else {
            bail!("No usable rows in {}", dataset.source());
        };

        let school = match school {
            Some(name) if dataset.has_school(name) => name.to_string(),
            Some(name) if view == ViewMode::Comparison => {
                warn!("Unknown school '{}' ignored in the comparison view", name);
                first_school.clone()
            }
            Some(name) => bail!(
                "Unknown school '{}'. Available schools: {}",
                name,
                schools.join(", ")
            ),
            None => first_school.clone(),
        };

        let available: BTreeSet<i32> = dataset.years().into_iter().collect();
        let years = match years {
            Some(requested) => {
                let mut selected = BTreeSet::new();
                for year in requested {
                    if available.contains(year) {
                        selected.insert(*year);
                    } else {
                        warn!("Year {} does not occur in the data, ignoring it", year);
                    }
                }
                if selected.is_empty() {
                    bail!("None of the requested years occur in the data");
                }
                selected
            }
            None => available,
        };

        Ok(Self {
            view,
            school,
            years,
        })
    }
}

/// Report settings taken from the merged configuration.
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub heatmap_metric: Metric,
    pub trend_metric: Metric,
    pub top_n: usize,
    pub decimals: usize,
    pub alert_rules: Vec<AlertRule>,
    pub alert_mode: AlertMode,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for DashboardSettings {
    fn from(config: &Config) -> Self {
        Self {
            heatmap_metric: config.report.heatmap_metric,
            trend_metric: config.report.trend_metric,
            top_n: config.report.top_n,
            decimals: config.report.decimals,
            alert_rules: config.alerts.rules.clone(),
            alert_mode: config.alerts.mode(),
        }
    }
}

/// A year offered in the selection controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearOption {
    pub year: i32,
    pub period: Period,
}

/// Values for the selection controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionOptions {
    pub schools: Vec<String>,
    pub years: Vec<YearOption>,
    pub views: Vec<ViewMode>,
}

impl SelectionOptions {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            schools: dataset.schools(),
            years: dataset
                .periods()
                .into_iter()
                .map(|(year, period)| YearOption { year, period })
                .collect(),
            views: vec![ViewMode::Comparison, ViewMode::SingleSchool],
        }
    }
}

/// Facts about the data behind the page.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardMetadata {
    pub data_source: String,
    pub generated_at: DateTime<Utc>,
    pub rows: usize,
    pub available_metrics: Vec<Metric>,
    pub missing_metrics: Vec<Metric>,
    pub has_alert_columns: bool,
}

/// The selection the page was rendered for.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionSummary {
    pub view: ViewMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    pub years: Vec<i32>,
}

/// Means of one school across the selected years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolMeans {
    pub school: String,
    pub means: BTreeMap<Metric, f64>,
}

/// Administrator page comparing every school.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonView {
    pub school_means: Vec<SchoolMeans>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<HeatmapMatrix>,
}

/// Line style hint for a trend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

impl fmt::Display for LineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineStyle::Solid => write!(f, "solid"),
            LineStyle::Dashed => write!(f, "dashed"),
            LineStyle::Dotted => write!(f, "dotted"),
        }
    }
}

/// One line of the trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub label: String,
    pub style: LineStyle,
    pub points: Vec<TrendPoint>,
}

/// Detail page for a single school.
#[derive(Debug, Clone, Serialize)]
pub struct SchoolView {
    pub school: String,
    pub yearly_means: Vec<YearlyMeans>,
    pub strengths: Vec<MetricMean>,
    pub challenges: Vec<MetricMean>,
    pub national: BTreeMap<Metric, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<BTreeMap<Metric, f64>>,
    pub trend_metric: Metric,
    pub trend: Vec<TrendSeries>,
}

/// Page body for the chosen view mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DashboardView {
    Comparison(ComparisonView),
    SingleSchool(SchoolView),
}

/// Alert section: evaluated rules, or why they could not be evaluated.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlertSection {
    Evaluated(AlertEvaluation),
    Unavailable { reason: String },
}

impl AlertSection {
    /// Whether any rule triggered.
    pub fn any_triggered(&self) -> bool {
        match self {
            AlertSection::Evaluated(eval) => eval.any_triggered(),
            AlertSection::Unavailable { .. } => false,
        }
    }
}

/// One rendered dashboard page.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub metadata: DashboardMetadata,
    pub options: SelectionOptions,
    pub selection: SelectionSummary,
    pub view: DashboardView,
    pub alerts: AlertSection,
    pub warnings: Vec<String>,
    /// Decimal places used when rendering tables.
    #[serde(skip)]
    pub decimals: usize,
}

/// Build the dashboard page for `selection`.
pub fn build_dashboard(
    dataset: &Dataset,
    selection: &Selection,
    settings: &DashboardSettings,
) -> Dashboard {
    let schema = dataset.schema();
    let metrics = schema.present_metrics();
    let mut warnings = Vec::new();

    warnings.extend(
        dataset
            .warnings()
            .iter()
            .map(|w| format!("Line {}: {}", w.line, w.message)),
    );

    let (view, alert_rows) = match selection.view {
        ViewMode::Comparison => {
            // Unlike the single-school baselines, the comparison honours the year filter.
            let rows = filter_rows(dataset.rows(), None, &selection.years);
            let view = comparison_view(&rows, &metrics, settings, dataset, &mut warnings);
            (DashboardView::Comparison(view), rows)
        }
        ViewMode::SingleSchool => {
            let rows = filter_rows(dataset.rows(), Some(&selection.school), &selection.years);
            let view = school_view(dataset, selection, &metrics, settings, &mut warnings);
            (DashboardView::SingleSchool(view), rows)
        }
    };

    let alerts = match evaluate_alerts(
        &alert_rows,
        schema,
        &settings.alert_rules,
        settings.alert_mode,
    ) {
        Ok(eval) => AlertSection::Evaluated(eval),
        Err(AnalysisError::MissingColumn { column }) => {
            warn!("Alerts unavailable: column '{}' missing", column);
            AlertSection::Unavailable {
                reason: format!(
                    "The '{}' column is not present in the data, so alerts cannot be evaluated",
                    column
                ),
            }
        }
        Err(e) => AlertSection::Unavailable {
            reason: e.to_string(),
        },
    };

    for warning in warnings.iter().skip(dataset.warnings().len()) {
        warn!("{}", warning);
    }

    Dashboard {
        metadata: DashboardMetadata {
            data_source: dataset.source().to_string(),
            generated_at: Utc::now(),
            rows: dataset.len(),
            available_metrics: metrics,
            missing_metrics: schema.missing_metrics(),
            has_alert_columns: schema.has_alert_columns(),
        },
        options: SelectionOptions::from_dataset(dataset),
        selection: SelectionSummary {
            view: selection.view,
            school: match selection.view {
                ViewMode::SingleSchool => Some(selection.school.clone()),
                ViewMode::Comparison => None,
            },
            years: selection.years.iter().copied().collect(),
        },
        view,
        alerts,
        warnings,
        decimals: settings.decimals,
    }
}

fn comparison_view(
    rows: &[Observation],
    metrics: &[Metric],
    settings: &DashboardSettings,
    dataset: &Dataset,
    warnings: &mut Vec<String>,
) -> ComparisonView {
    let school_means = match group_means(rows, &[GroupKey::School], metrics) {
        Ok(groups) => groups
            .into_iter()
            .filter_map(|(key, means)| match key.into_iter().next() {
                Some(KeyValue::School(school)) => Some(SchoolMeans { school, means }),
                _ => None,
            })
            .collect(),
        Err(e) => {
            warnings.push(format!("School comparison omitted: {}", e));
            Vec::new()
        }
    };

    let heatmap = if dataset.schema().has_metric(settings.heatmap_metric) {
        match heatmap(rows, settings.heatmap_metric) {
            Ok(matrix) => Some(matrix),
            Err(e) => {
                warnings.push(format!("Heatmap omitted: {}", e));
                None
            }
        }
    } else {
        warnings.push(format!(
            "Heatmap omitted: the '{}' column is not present in the data",
            settings.heatmap_metric.key()
        ));
        None
    };

    debug!("Comparison view over {} rows", rows.len());

    ComparisonView {
        school_means,
        heatmap,
    }
}

fn school_view(
    dataset: &Dataset,
    selection: &Selection,
    metrics: &[Metric],
    settings: &DashboardSettings,
    warnings: &mut Vec<String>,
) -> SchoolView {
    let all_rows = dataset.rows();
    let school = selection.school.as_str();

    let yearly = match yearly_means(all_rows, school, &selection.years, metrics) {
        Ok(table) => table,
        Err(e) => {
            warnings.push(format!("Yearly means omitted: {}", e));
            Vec::new()
        }
    };

    // Strengths and challenges cover every year of the school.
    let school_rows: Vec<Observation> = all_rows
        .iter()
        .filter(|r| r.school == school)
        .cloned()
        .collect();
    let (strengths, challenges) = match top_and_bottom_n(&school_rows, metrics, settings.top_n)
    {
        Ok(ranked) => (ranked.top, ranked.bottom),
        Err(e) => {
            warnings.push(format!("Strengths and challenges omitted: {}", e));
            (Vec::new(), Vec::new())
        }
    };

    let (national, district) = match comparison_baselines(all_rows, school, metrics) {
        Ok(baselines) => (baselines.national, Some(baselines.district)),
        Err(e) => {
            warnings.push(format!("District comparison omitted: {}", e));
            (national_average(all_rows, metrics).unwrap_or_default(), None)
        }
    };

    let metric = settings.trend_metric;
    let school_points = trend(all_rows, school, &selection.years, metric);
    let mut series = vec![TrendSeries {
        label: format!("{} - {}", school, metric),
        style: LineStyle::Solid,
        points: school_points.clone(),
    }];

    if let Some(&value) = national.get(&metric) {
        series.push(TrendSeries {
            label: format!("National average - {}", metric),
            style: LineStyle::Dashed,
            points: flat_line(&school_points, value),
        });
    }
    if let Some(&value) = district.as_ref().and_then(|d| d.get(&metric)) {
        series.push(TrendSeries {
            label: format!("District excl. {} - {}", school, metric),
            style: LineStyle::Dotted,
            points: flat_line(&school_points, value),
        });
    }

    SchoolView {
        school: school.to_string(),
        yearly_means: yearly,
        strengths,
        challenges,
        national,
        district,
        trend_metric: metric,
        trend: series,
    }
}

/// A constant reference line over the years of `points`.
fn flat_line(points: &[TrendPoint], value: f64) -> Vec<TrendPoint> {
    points
        .iter()
        .map(|p| TrendPoint {
            year: p.year,
            value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSchema;

    fn full_row(school: &str, year: i32, values: [f64; Metric::COUNT]) -> Observation {
        Metric::ALL
            .iter()
            .zip(values)
            .fold(Observation::new(school, year), |row, (m, v)| {
                row.with_score(*m, v)
            })
    }

    fn create_test_dataset() -> Dataset {
        Dataset::from_rows(
            vec![
                full_row("Akurskóli", 2022, [6.0, 3.0, 2.0, 5.0, 8.0, 7.0]),
                full_row("Akurskóli", 2023, [7.0, 3.0, 2.0, 5.0, 8.0, 7.0]),
                full_row("Heiðarskóli", 2022, [5.0, 4.5, 5.5, 6.0, 6.0, 5.0]),
                full_row("Heiðarskóli", 2023, [5.0, 4.5, 5.5, 6.0, 6.0, 5.0]),
            ],
            DatasetSchema::complete(),
        )
    }

    #[test]
    fn test_selection_defaults() {
        let dataset = create_test_dataset();
        let selection = Selection::resolve(&dataset, ViewMode::Comparison, None, None).unwrap();

        assert_eq!(selection.school, "Akurskóli");
        assert_eq!(selection.years.len(), 2);
    }

    #[test]
    fn test_selection_rejects_unknown_school() {
        let dataset = create_test_dataset();
        let err = Selection::resolve(&dataset, ViewMode::SingleSchool, Some("Nowhere"), None)
            .unwrap_err();
        assert!(err.to_string().contains("Unknown school"));
    }

    #[test]
    fn test_comparison_ignores_unknown_school() {
        let dataset = create_test_dataset();
        let selection =
            Selection::resolve(&dataset, ViewMode::Comparison, Some("Nowhere"), None).unwrap();

        assert_eq!(selection.school, "Akurskóli");
        assert_eq!(selection.view, ViewMode::Comparison);
    }

    #[test]
    fn test_selection_drops_unknown_years() {
        let dataset = create_test_dataset();
        let selection =
            Selection::resolve(&dataset, ViewMode::Comparison, None, Some(&[2023, 1999][..]))
                .unwrap();
        assert_eq!(selection.years.into_iter().collect::<Vec<_>>(), vec![2023]);

        assert!(Selection::resolve(&dataset, ViewMode::Comparison, None, Some(&[1999][..])).is_err());
    }

    #[test]
    fn test_comparison_dashboard() {
        let dataset = create_test_dataset();
        let selection = Selection::resolve(&dataset, ViewMode::Comparison, None, None).unwrap();

        let dashboard = build_dashboard(&dataset, &selection, &DashboardSettings::default());

        let DashboardView::Comparison(view) = &dashboard.view else {
            panic!("expected comparison view");
        };
        assert_eq!(view.school_means.len(), 2);
        assert_eq!(view.school_means[0].means[&Metric::Wellbeing], 6.5);
        let matrix = view.heatmap.as_ref().unwrap();
        assert_eq!(matrix.get(2023, "Heiðarskóli"), Some(5.0));

        // Heiðarskóli is half of the rows and scores above both thresholds.
        assert!(dashboard.alerts.any_triggered());
        assert!(dashboard.warnings.is_empty());
        assert_eq!(dashboard.selection.school, None);
    }

    #[test]
    fn test_single_school_dashboard() {
        let dataset = create_test_dataset();
        let selection = Selection::resolve(
            &dataset,
            ViewMode::SingleSchool,
            Some("Akurskóli"),
            Some(&[2022, 2023][..]),
        )
        .unwrap();

        let dashboard = build_dashboard(&dataset, &selection, &DashboardSettings::default());

        let DashboardView::SingleSchool(view) = &dashboard.view else {
            panic!("expected single-school view");
        };
        assert_eq!(view.yearly_means.len(), 2);
        assert_eq!(view.strengths[0].metric, Metric::TeacherRelationship);
        assert_eq!(view.challenges[0].metric, Metric::Loneliness);
        assert_eq!(view.district.as_ref().unwrap()[&Metric::Wellbeing], 5.0);
        assert_eq!(view.national[&Metric::Wellbeing], 5.75);

        assert_eq!(view.trend.len(), 3);
        assert_eq!(view.trend[0].style, LineStyle::Solid);
        assert_eq!(view.trend[0].points.len(), 2);
        assert!(view.trend[1].points.iter().all(|p| p.value == 5.75));

        assert!(!dashboard.alerts.any_triggered());
    }

    #[test]
    fn test_single_school_without_other_schools() {
        let dataset = Dataset::from_rows(
            vec![full_row("Only", 2022, [6.0, 3.0, 2.0, 5.0, 8.0, 7.0])],
            DatasetSchema::complete(),
        );
        let selection =
            Selection::resolve(&dataset, ViewMode::SingleSchool, None, None).unwrap();

        let dashboard = build_dashboard(&dataset, &selection, &DashboardSettings::default());

        let DashboardView::SingleSchool(view) = &dashboard.view else {
            panic!("expected single-school view");
        };
        assert!(view.district.is_none());
        assert_eq!(view.national[&Metric::Wellbeing], 6.0);
        assert_eq!(view.trend.len(), 2);
        assert!(dashboard
            .warnings
            .iter()
            .any(|w| w.starts_with("District comparison omitted")));
    }

    #[test]
    fn test_missing_alert_columns() {
        let rows = vec![
            Observation::new("A", 2022)
                .with_score(Metric::Wellbeing, 6.0)
                .with_score(Metric::Anxiety, 3.0),
            Observation::new("B", 2022)
                .with_score(Metric::Wellbeing, 5.0)
                .with_score(Metric::Anxiety, 4.5),
        ];
        let dataset = Dataset::from_rows(
            rows,
            DatasetSchema::from_present(&[Metric::Wellbeing, Metric::Anxiety]),
        );
        let selection = Selection::resolve(&dataset, ViewMode::Comparison, None, None).unwrap();

        let dashboard = build_dashboard(&dataset, &selection, &DashboardSettings::default());

        match &dashboard.alerts {
            AlertSection::Unavailable { reason } => assert!(reason.contains("loneliness")),
            other => panic!("expected unavailable alerts, got {:?}", other),
        }
        assert!(!dashboard.metadata.has_alert_columns);
        assert_eq!(dashboard.metadata.missing_metrics.len(), 4);
    }

    #[test]
    fn test_heatmap_metric_missing() {
        let dataset = Dataset::from_rows(
            vec![Observation::new("A", 2022).with_score(Metric::Anxiety, 3.0)],
            DatasetSchema::from_present(&[Metric::Anxiety]),
        );
        let selection = Selection::resolve(&dataset, ViewMode::Comparison, None, None).unwrap();

        let dashboard = build_dashboard(&dataset, &selection, &DashboardSettings::default());

        let DashboardView::Comparison(view) = &dashboard.view else {
            panic!("expected comparison view");
        };
        assert!(view.heatmap.is_none());
        assert!(dashboard.warnings.iter().any(|w| w.starts_with("Heatmap omitted")));
    }

    #[test]
    fn test_fixture_comparison_alerts() {
        let dataset = Dataset::load(std::path::Path::new("fixtures/wellbeing_sample.csv")).unwrap();
        let selection = Selection::resolve(&dataset, ViewMode::Comparison, None, None).unwrap();

        let dashboard = build_dashboard(&dataset, &selection, &DashboardSettings::default());

        // 5 of 16 rows exceed each default threshold.
        let AlertSection::Evaluated(eval) = &dashboard.alerts else {
            panic!("expected evaluated alerts");
        };
        assert_eq!(eval.triggered().count(), 2);
        assert_eq!(eval.outcomes[0].qualifying_rows, 5);
        assert_eq!(eval.outcomes[0].total_rows, 16);

        let selection =
            Selection::resolve(&dataset, ViewMode::SingleSchool, Some("Akurskóli"), None)
                .unwrap();
        let dashboard = build_dashboard(&dataset, &selection, &DashboardSettings::default());
        assert!(!dashboard.alerts.any_triggered());
    }

    #[test]
    fn test_dashboard_serializes_to_json() {
        let dataset = create_test_dataset();
        let selection =
            Selection::resolve(&dataset, ViewMode::SingleSchool, None, None).unwrap();
        let dashboard = build_dashboard(&dataset, &selection, &DashboardSettings::default());

        let value = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(value["view"]["mode"], "single_school");
        assert_eq!(value["alerts"]["status"], "evaluated");
        assert_eq!(value["alerts"]["mode"]["kind"], "proportion");
        assert_eq!(value["options"]["years"][0]["period"], "spring");
        assert!(value["view"]["national"]["wellbeing"].is_number());
    }
}
