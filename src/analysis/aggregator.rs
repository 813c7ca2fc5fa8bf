//! Group means, rankings, baselines and trends.
//!
//! Every function takes the rows to aggregate explicitly; callers decide
//! which subset of the loaded dataset a view is computed over.

use super::error::AnalysisError;
use crate::models::{GroupKey, KeyValue, Metric, Observation, Period};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Means keyed by group-key tuple, then by metric.
pub type GroupMeans = BTreeMap<Vec<KeyValue>, BTreeMap<Metric, f64>>;

/// Running sum/count for one mean.
#[derive(Debug, Default, Clone, Copy)]
struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// `None` when nothing was pushed, so callers never see NaN.
    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// A metric paired with its mean over some row set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricMean {
    pub metric: Metric,
    pub mean: f64,
}

/// Highest and lowest metric means.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMetrics {
    /// Highest means first.
    pub top: Vec<MetricMean>,
    /// Lowest means first.
    pub bottom: Vec<MetricMean>,
}

/// Reference means used to compare a single school.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baselines {
    /// Mean over every row.
    pub national: BTreeMap<Metric, f64>,
    /// Mean over every row of the other schools.
    pub district: BTreeMap<Metric, f64>,
}

/// One point of a yearly trend line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub year: i32,
    pub value: f64,
}

/// Years × schools matrix of one metric's means.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapMatrix {
    pub metric: Metric,
    /// Row labels, ascending.
    pub years: Vec<i32>,
    /// Column labels, sorted by name.
    pub schools: Vec<String>,
    /// `cells[year_idx][school_idx]`; `None` where the school has no data that year.
    pub cells: Vec<Vec<Option<f64>>>,
}

impl HeatmapMatrix {
    /// Looks up one cell by its labels.
    pub fn get(&self, year: i32, school: &str) -> Option<f64> {
        let row = self.years.iter().position(|y| *y == year)?;
        let col = self.schools.iter().position(|s| s == school)?;
        self.cells[row][col]
    }
}

/// Means of one school for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyMeans {
    pub year: i32,
    pub period: Period,
    pub means: BTreeMap<Metric, f64>,
}

/// Mean of every metric over the given rows, skipping metrics without values.
pub fn means_over<'a, I>(rows: I, metrics: &[Metric]) -> BTreeMap<Metric, f64>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut accumulators: BTreeMap<Metric, MeanAccumulator> = BTreeMap::new();

    for row in rows {
        for &metric in metrics {
            if let Some(value) = row.score(metric) {
                accumulators.entry(metric).or_default().push(value);
            }
        }
    }

    accumulators
        .into_iter()
        .filter_map(|(metric, acc)| acc.mean().map(|mean| (metric, mean)))
        .collect()
}

/// Rows of an optional school restricted to a set of years.
pub fn filter_rows(
    rows: &[Observation],
    school: Option<&str>,
    years: &BTreeSet<i32>,
) -> Vec<Observation> {
    rows.iter()
        .filter(|row| school.map_or(true, |s| row.school == s))
        .filter(|row| years.contains(&row.year))
        .cloned()
        .collect()
}

/// Mean of each metric for every distinct combination of `group_keys`.
pub fn group_means(
    rows: &[Observation],
    group_keys: &[GroupKey],
    metrics: &[Metric],
) -> Result<GroupMeans, AnalysisError> {
    if group_keys.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "at least one group key is required".to_string(),
        ));
    }
    if metrics.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "at least one metric is required".to_string(),
        ));
    }

    let mut groups: BTreeMap<Vec<KeyValue>, Vec<&Observation>> = BTreeMap::new();
    for row in rows {
        let key: Vec<KeyValue> = group_keys.iter().map(|k| k.value_of(row)).collect();
        groups.entry(key).or_default().push(row);
    }

    Ok(groups
        .into_iter()
        .map(|(key, members)| (key, means_over(members, metrics)))
        .collect())
}

/// The `n` highest and `n` lowest metric means over `rows`.
///
/// Both lists break ties by the order of `metrics`. `bottom` is drawn from
/// the metrics not in `top`, so the two are disjoint whenever `2n` metrics
/// have values; with fewer, `bottom` is the `n` lowest of all of them.
pub fn top_and_bottom_n(
    rows: &[Observation],
    metrics: &[Metric],
    n: usize,
) -> Result<RankedMetrics, AnalysisError> {
    if n > metrics.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "cannot rank {} metrics out of {}",
            n,
            metrics.len()
        )));
    }
    if rows.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "no rows to rank metrics over".to_string(),
        ));
    }

    let means = means_over(rows, metrics);
    let ranked: Vec<MetricMean> = metrics
        .iter()
        .filter_map(|m| means.get(m).map(|&mean| MetricMean { metric: *m, mean }))
        .collect();

    if ranked.len() < n {
        return Err(AnalysisError::InsufficientData(format!(
            "only {} of the requested metrics have values, {} needed",
            ranked.len(),
            n
        )));
    }

    // Stable sorts: equal means keep the order of `metrics`.
    let mut descending = ranked.clone();
    descending.sort_by(|a, b| b.mean.partial_cmp(&a.mean).unwrap_or(Ordering::Equal));
    let top = descending[..n].to_vec();

    let mut ascending: Vec<MetricMean> = if 2 * n <= ranked.len() {
        ranked
            .into_iter()
            .filter(|m| top.iter().all(|t| t.metric != m.metric))
            .collect()
    } else {
        ranked
    };
    ascending.sort_by(|a, b| a.mean.partial_cmp(&b.mean).unwrap_or(Ordering::Equal));
    ascending.truncate(n);

    Ok(RankedMetrics {
        top,
        bottom: ascending,
    })
}

/// Mean of each metric over every row.
pub fn national_average(
    rows: &[Observation],
    metrics: &[Metric],
) -> Result<BTreeMap<Metric, f64>, AnalysisError> {
    if rows.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "no rows for a national average".to_string(),
        ));
    }
    Ok(means_over(rows, metrics))
}

/// National average and the average of every school except `target_school`.
pub fn comparison_baselines(
    rows: &[Observation],
    target_school: &str,
    metrics: &[Metric],
) -> Result<Baselines, AnalysisError> {
    let national = national_average(rows, metrics)?;

    let others: Vec<&Observation> = rows
        .iter()
        .filter(|row| row.school != target_school)
        .collect();

    if others.is_empty() {
        return Err(AnalysisError::InsufficientData(format!(
            "no schools other than '{}' to form a district average",
            target_school
        )));
    }

    Ok(Baselines {
        national,
        district: means_over(others, metrics),
    })
}

/// Yearly means of one metric for one school, ascending by year.
///
/// Years outside `year_filter` and years without values are left out.
pub fn trend(
    rows: &[Observation],
    school: &str,
    year_filter: &BTreeSet<i32>,
    metric: Metric,
) -> Vec<TrendPoint> {
    let mut by_year: BTreeMap<i32, MeanAccumulator> = BTreeMap::new();

    for row in rows
        .iter()
        .filter(|row| row.school == school && year_filter.contains(&row.year))
    {
        if let Some(value) = row.score(metric) {
            by_year.entry(row.year).or_default().push(value);
        }
    }

    by_year
        .into_iter()
        .filter_map(|(year, acc)| acc.mean().map(|value| TrendPoint { year, value }))
        .collect()
}

/// Years × schools matrix of the means of `metric`.
pub fn heatmap(rows: &[Observation], metric: Metric) -> Result<HeatmapMatrix, AnalysisError> {
    let means = group_means(rows, &[GroupKey::Year, GroupKey::School], &[metric])?;

    let years: Vec<i32> = rows
        .iter()
        .map(|r| r.year)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let schools: Vec<String> = rows
        .iter()
        .map(|r| r.school.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let cells = years
        .iter()
        .map(|year| {
            schools
                .iter()
                .map(|school| {
                    let key = vec![KeyValue::Year(*year), KeyValue::School(school.clone())];
                    means.get(&key).and_then(|m| m.get(&metric).copied())
                })
                .collect()
        })
        .collect();

    Ok(HeatmapMatrix {
        metric,
        years,
        schools,
        cells,
    })
}

/// Per-year means of one school over the selected years.
pub fn yearly_means(
    rows: &[Observation],
    school: &str,
    year_filter: &BTreeSet<i32>,
    metrics: &[Metric],
) -> Result<Vec<YearlyMeans>, AnalysisError> {
    let selected = filter_rows(rows, Some(school), year_filter);
    let grouped = group_means(&selected, &[GroupKey::Year], metrics)?;

    Ok(grouped
        .into_iter()
        .filter_map(|(key, means)| match key.first() {
            Some(KeyValue::Year(year)) => Some(YearlyMeans {
                year: *year,
                period: Period::from_year(*year),
                means,
            }),
            _ => None,
        })
        .collect())
}
