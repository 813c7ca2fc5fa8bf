//! Data models for the wellbeing dashboard.
//!
//! This module contains the core data structures shared by the dataset
//! loader, the aggregator and the report builder: survey metrics,
//! observations, grouping keys and alert rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six numeric survey dimensions.
///
/// Declaration order is significant: it is the tie-break order used when
/// ranking metrics and the column order of every rendered table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Overall wellbeing score
    Wellbeing,
    /// Anxiety score
    Anxiety,
    /// Loneliness score
    Loneliness,
    /// Screen time score
    ScreenTime,
    /// Relationship with teachers
    TeacherRelationship,
    /// Satisfaction with the school
    SchoolSatisfaction,
}

impl Metric {
    /// Number of survey dimensions.
    pub const COUNT: usize = 6;

    /// All metrics in declaration order.
    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::Wellbeing,
        Metric::Anxiety,
        Metric::Loneliness,
        Metric::ScreenTime,
        Metric::TeacherRelationship,
        Metric::SchoolSatisfaction,
    ];

    /// Position of the metric in [`Metric::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical column key.
    pub fn key(self) -> &'static str {
        match self {
            Metric::Wellbeing => "wellbeing",
            Metric::Anxiety => "anxiety",
            Metric::Loneliness => "loneliness",
            Metric::ScreenTime => "screen_time",
            Metric::TeacherRelationship => "teacher_relationship",
            Metric::SchoolSatisfaction => "school_satisfaction",
        }
    }

    /// Header names accepted for this metric in the input file.
    ///
    /// The Icelandic names are the headers of the national survey export.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Metric::Wellbeing => &["wellbeing", "well-being", "Líðan"],
            Metric::Anxiety => &["anxiety", "Kvíði"],
            Metric::Loneliness => &["loneliness", "Einmanaleiki"],
            Metric::ScreenTime => &["screen_time", "screen time", "Skjástund"],
            Metric::TeacherRelationship => &[
                "teacher_relationship",
                "teacher relationship",
                "Tengsl við kennara",
            ],
            Metric::SchoolSatisfaction => &[
                "school_satisfaction",
                "school satisfaction",
                "Ánægja með skólann",
            ],
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Wellbeing => write!(f, "Wellbeing"),
            Metric::Anxiety => write!(f, "Anxiety"),
            Metric::Loneliness => write!(f, "Loneliness"),
            Metric::ScreenTime => write!(f, "Screen time"),
            Metric::TeacherRelationship => write!(f, "Teacher relationship"),
            Metric::SchoolSatisfaction => write!(f, "School satisfaction"),
        }
    }
}

/// Survey period derived from the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Spring,
    Fall,
}

impl Period {
    /// Even years are spring surveys, odd years are fall surveys.
    pub fn from_year(year: i32) -> Self {
        if year % 2 == 0 {
            Period::Spring
        } else {
            Period::Fall
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Spring => write!(f, "spring"),
            Period::Fall => write!(f, "fall"),
        }
    }
}

/// One survey aggregate for a (school, year) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// School name.
    pub school: String,
    /// Survey year.
    pub year: i32,
    /// Metric values indexed by [`Metric::index`]. `None` when the column is
    /// absent or the cell was blank.
    scores: [Option<f64>; Metric::COUNT],
}

impl Observation {
    /// Creates an observation with no metric values.
    pub fn new(school: impl Into<String>, year: i32) -> Self {
        Self {
            school: school.into(),
            year,
            scores: [None; Metric::COUNT],
        }
    }

    /// Builder-style setter for one metric value.
    pub fn with_score(mut self, metric: Metric, value: f64) -> Self {
        self.scores[metric.index()] = Some(value);
        self
    }

    /// Sets (or clears) one metric value.
    pub fn set_score(&mut self, metric: Metric, value: Option<f64>) {
        self.scores[metric.index()] = value;
    }

    /// Returns the value of a metric, if present.
    pub fn score(&self, metric: Metric) -> Option<f64> {
        self.scores[metric.index()]
    }

    /// Survey period of this observation.
    pub fn period(&self) -> Period {
        Period::from_year(self.year)
    }
}

/// Categorical attribute used to partition rows before averaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    School,
    Year,
}

impl GroupKey {
    /// Extracts this key's value from a row.
    pub fn value_of(self, row: &Observation) -> KeyValue {
        match self {
            GroupKey::School => KeyValue::School(row.school.clone()),
            GroupKey::Year => KeyValue::Year(row.year),
        }
    }
}

/// Concrete value of a [`GroupKey`] for one group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    School(String),
    Year(i32),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::School(s) => write!(f, "{}", s),
            KeyValue::Year(y) => write!(f, "{}", y),
        }
    }
}

/// Which page the dashboard renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Administrator view comparing all schools
    #[default]
    Comparison,
    /// Detail view for one school
    SingleSchool,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Comparison => write!(f, "comparison"),
            ViewMode::SingleSchool => write!(f, "single-school"),
        }
    }
}

/// Comparison applied between a metric value and an alert threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl ComparisonOp {
    /// Returns true when `value <op> threshold` holds.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOp::Gt => value > threshold,
            ComparisonOp::Ge => value >= threshold,
            ComparisonOp::Lt => value < threshold,
            ComparisonOp::Le => value <= threshold,
        }
    }

    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A threshold rule that raises an alert with a fixed recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Stable identifier of the alert kind.
    pub id: String,
    /// Metric the rule inspects.
    pub metric: Metric,
    /// Comparison between the row value and the threshold.
    pub op: ComparisonOp,
    /// Threshold value on the survey scale.
    pub threshold: f64,
    /// Human-readable recommendation shown when the alert triggers.
    pub recommendation: String,
}

impl AlertRule {
    /// The loneliness and anxiety rules shipped with the dashboard.
    pub fn defaults() -> Vec<AlertRule> {
        vec![
            AlertRule {
                id: "high-loneliness".to_string(),
                metric: Metric::Loneliness,
                op: ComparisonOp::Gt,
                threshold: 5.0,
                recommendation:
                    "Improve social services or provide additional counselling.".to_string(),
            },
            AlertRule {
                id: "high-anxiety".to_string(),
                metric: Metric::Anxiety,
                op: ComparisonOp::Gt,
                threshold: 4.0,
                recommendation: "Increase academic and social support.".to_string(),
            },
        ]
    }
}

/// How an alert rule turns qualifying rows into a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlertModeKind {
    /// Trigger when at least one row qualifies
    Existence,
    /// Trigger when the share of qualifying rows reaches `min_share`
    Proportion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_ordering_follows_declaration() {
        let mut shuffled = vec![
            Metric::SchoolSatisfaction,
            Metric::Wellbeing,
            Metric::Loneliness,
            Metric::Anxiety,
        ];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![
                Metric::Wellbeing,
                Metric::Anxiety,
                Metric::Loneliness,
                Metric::SchoolSatisfaction
            ]
        );
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
        }
    }

    #[test]
    fn test_period_from_year_parity() {
        assert_eq!(Period::from_year(2022), Period::Spring);
        assert_eq!(Period::from_year(2023), Period::Fall);
        assert_eq!(Period::from_year(2022).to_string(), "spring");
        assert_eq!(Observation::new("A", 2021).period(), Period::Fall);
    }

    #[test]
    fn test_observation_scores() {
        let mut row = Observation::new("Akurskóli", 2022).with_score(Metric::Anxiety, 3.5);
        assert_eq!(row.score(Metric::Anxiety), Some(3.5));
        assert_eq!(row.score(Metric::Wellbeing), None);

        row.set_score(Metric::Anxiety, None);
        assert_eq!(row.score(Metric::Anxiety), None);
    }

    #[test]
    fn test_comparison_ops() {
        assert!(ComparisonOp::Gt.holds(5.1, 5.0));
        assert!(!ComparisonOp::Gt.holds(5.0, 5.0));
        assert!(ComparisonOp::Ge.holds(5.0, 5.0));
        assert!(ComparisonOp::Lt.holds(1.0, 2.0));
        assert!(ComparisonOp::Le.holds(2.0, 2.0));
        assert_eq!(ComparisonOp::Ge.to_string(), ">=");
    }

    #[test]
    fn test_key_value_ordering() {
        let mut keys = vec![
            KeyValue::Year(2023),
            KeyValue::Year(2021),
            KeyValue::Year(2022),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                KeyValue::Year(2021),
                KeyValue::Year(2022),
                KeyValue::Year(2023)
            ]
        );
        assert_eq!(GroupKey::School.value_of(&Observation::new("B", 2020)).to_string(), "B");
    }

    #[test]
    fn test_default_alert_rules() {
        let rules = AlertRule::defaults();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].metric, Metric::Loneliness);
        assert_eq!(rules[0].threshold, 5.0);
        assert_eq!(rules[1].metric, Metric::Anxiety);
        assert_eq!(rules[1].op, ComparisonOp::Gt);
    }
}
