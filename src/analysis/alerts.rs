//! Threshold alerts over the selected rows.
//!
//! Each rule reports both the share of rows that satisfy it and whether it
//! triggered under the configured [`AlertMode`], so the rendered message can
//! state exactly the condition that was checked.

use super::error::AnalysisError;
use crate::dataset::DatasetSchema;
use crate::models::{AlertModeKind, AlertRule, ComparisonOp, Metric, Observation};
use serde::Serialize;
use std::collections::BTreeSet;

/// Default share of qualifying rows for proportion alerts.
pub const DEFAULT_MIN_SHARE: f64 = 0.25;

/// Condition under which a rule triggers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AlertMode {
    /// At least one row satisfies the rule.
    Existence,
    /// At least `min_share` of the rows with a value satisfy the rule.
    Proportion { min_share: f64 },
}

impl Default for AlertMode {
    fn default() -> Self {
        AlertMode::Proportion {
            min_share: DEFAULT_MIN_SHARE,
        }
    }
}

impl AlertMode {
    /// Builds a mode from its configured kind and share.
    pub fn from_kind(kind: AlertModeKind, min_share: f64) -> Self {
        match kind {
            AlertModeKind::Existence => AlertMode::Existence,
            AlertModeKind::Proportion => AlertMode::Proportion { min_share },
        }
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        match self {
            AlertMode::Proportion { min_share } if !(*min_share > 0.0 && *min_share <= 1.0) => {
                Err(AnalysisError::InvalidInput(format!(
                    "alert share must be in (0, 1], got {}",
                    min_share
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertOutcome {
    pub rule_id: String,
    pub metric: Metric,
    pub op: ComparisonOp,
    pub threshold: f64,
    /// Rows whose value satisfies the rule.
    pub qualifying_rows: usize,
    /// Rows with a value for the metric.
    pub total_rows: usize,
    /// `qualifying_rows / total_rows`, 0 when there are no rows.
    pub proportion: f64,
    pub triggered: bool,
    /// Description of the checked condition and its result.
    pub message: String,
    pub recommendation: String,
}

/// Outcomes of every rule, in rule order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvaluation {
    pub mode: AlertMode,
    pub outcomes: Vec<AlertOutcome>,
}

impl AlertEvaluation {
    /// Identifiers of the rules that triggered.
    pub fn triggered_ids(&self) -> BTreeSet<String> {
        self.triggered().map(|o| o.rule_id.clone()).collect()
    }

    /// Outcomes of the rules that triggered.
    pub fn triggered(&self) -> impl Iterator<Item = &AlertOutcome> {
        self.outcomes.iter().filter(|o| o.triggered)
    }

    /// Whether any rule triggered.
    pub fn any_triggered(&self) -> bool {
        self.outcomes.iter().any(|o| o.triggered)
    }
}

/// Evaluates every rule over `rows`.
///
/// Fails with [`AnalysisError::MissingColumn`] when a rule refers to a
/// metric the dataset does not carry, so callers can show a data
/// availability warning instead of an empty alert list.
pub fn evaluate_alerts(
    rows: &[Observation],
    schema: &DatasetSchema,
    rules: &[AlertRule],
    mode: AlertMode,
) -> Result<AlertEvaluation, AnalysisError> {
    mode.validate()?;

    if let Some(rule) = rules.iter().find(|r| !schema.has_metric(r.metric)) {
        return Err(AnalysisError::MissingColumn {
            column: rule.metric.key().to_string(),
        });
    }

    let outcomes = rules
        .iter()
        .map(|rule| evaluate_rule(rows, rule, mode))
        .collect();

    Ok(AlertEvaluation { mode, outcomes })
}

fn evaluate_rule(rows: &[Observation], rule: &AlertRule, mode: AlertMode) -> AlertOutcome {
    let values: Vec<f64> = rows.iter().filter_map(|r| r.score(rule.metric)).collect();
    let total_rows = values.len();
    let qualifying_rows = values
        .iter()
        .filter(|v| rule.op.holds(**v, rule.threshold))
        .count();

    let proportion = if total_rows == 0 {
        0.0
    } else {
        qualifying_rows as f64 / total_rows as f64
    };

    let triggered = match mode {
        AlertMode::Existence => qualifying_rows > 0,
        AlertMode::Proportion { min_share } => total_rows > 0 && proportion >= min_share,
    };

    let condition = format!(
        "{} {} {}",
        rule.metric.to_string().to_lowercase(),
        rule.op,
        rule.threshold
    );
    let message = match mode {
        AlertMode::Existence => format!(
            "{} of {} rows have {} (alert on any row)",
            qualifying_rows, total_rows, condition
        ),
        AlertMode::Proportion { min_share } => format!(
            "{:.0}% of rows have {} (alert at {:.0}% or more)",
            proportion * 100.0,
            condition,
            min_share * 100.0
        ),
    };

    AlertOutcome {
        rule_id: rule.id.clone(),
        metric: rule.metric,
        op: rule.op,
        threshold: rule.threshold,
        qualifying_rows,
        total_rows,
        proportion,
        triggered,
        message,
        recommendation: rule.recommendation.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_rows() -> Vec<Observation> {
        vec![
            Observation::new("A", 2022)
                .with_score(Metric::Loneliness, 6.0)
                .with_score(Metric::Anxiety, 3.0),
            Observation::new("A", 2023)
                .with_score(Metric::Loneliness, 2.0)
                .with_score(Metric::Anxiety, 3.5),
            Observation::new("B", 2022)
                .with_score(Metric::Loneliness, 3.0)
                .with_score(Metric::Anxiety, 2.0),
            Observation::new("B", 2023)
                .with_score(Metric::Loneliness, 4.0)
                .with_score(Metric::Anxiety, 1.0),
            Observation::new("C", 2023)
                .with_score(Metric::Loneliness, 1.0)
                .with_score(Metric::Anxiety, 4.5),
        ]
    }

    #[test]
    fn test_existence_mode_triggers_on_any_row() {
        let rows = create_test_rows();
        let schema = DatasetSchema::complete();

        let eval =
            evaluate_alerts(&rows, &schema, &AlertRule::defaults(), AlertMode::Existence).unwrap();

        assert_eq!(
            eval.triggered_ids(),
            ["high-anxiety", "high-loneliness"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
        let loneliness = &eval.outcomes[0];
        assert_eq!(loneliness.qualifying_rows, 1);
        assert_eq!(loneliness.total_rows, 5);
        assert!((loneliness.proportion - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_proportion_mode_uses_share() {
        let rows = create_test_rows();
        let schema = DatasetSchema::complete();

        let eval = evaluate_alerts(
            &rows,
            &schema,
            &AlertRule::defaults(),
            AlertMode::Proportion { min_share: 0.25 },
        )
        .unwrap();

        // One of five rows qualifies for each rule: 20% is below 25%.
        assert!(!eval.any_triggered());
        assert!(eval.outcomes[0].message.contains("20%"));
        assert!(eval.outcomes[0].message.contains("25%"));

        let eval = evaluate_alerts(
            &rows,
            &schema,
            &AlertRule::defaults(),
            AlertMode::Proportion { min_share: 0.2 },
        )
        .unwrap();
        assert_eq!(eval.triggered().count(), 2);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let rows = create_test_rows();
        let schema = DatasetSchema::from_present(&[Metric::Wellbeing, Metric::Anxiety]);

        let err = evaluate_alerts(&rows, &schema, &AlertRule::defaults(), AlertMode::default())
            .unwrap_err();

        assert_eq!(
            err,
            AnalysisError::MissingColumn {
                column: "loneliness".to_string()
            }
        );
    }

    #[test]
    fn test_empty_rows_never_trigger() {
        let schema = DatasetSchema::complete();

        for mode in [AlertMode::Existence, AlertMode::default()] {
            let eval = evaluate_alerts(&[], &schema, &AlertRule::defaults(), mode).unwrap();
            assert!(!eval.any_triggered());
            assert!(eval.outcomes.iter().all(|o| o.proportion == 0.0));
        }
    }

    #[test]
    fn test_invalid_share_rejected() {
        let schema = DatasetSchema::complete();
        let err = evaluate_alerts(
            &create_test_rows(),
            &schema,
            &AlertRule::defaults(),
            AlertMode::Proportion { min_share: 1.5 },
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[test]
    fn test_mode_from_kind() {
        assert_eq!(
            AlertMode::from_kind(AlertModeKind::Existence, 0.5),
            AlertMode::Existence
        );
        assert_eq!(
            AlertMode::from_kind(AlertModeKind::Proportion, 0.5),
            AlertMode::Proportion { min_share: 0.5 }
        );
    }
}
