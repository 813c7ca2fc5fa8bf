//! Errors reported by the aggregation functions.

use thiserror::Error;

/// Why an aggregation request could not produce a result.
///
/// None of these are fatal to a dashboard run: the report builder turns
/// them into warnings and keeps rendering the remaining sections.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// The request itself is malformed (empty group keys, `n` too large, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The candidate row set is empty, so no mean can be formed.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A required column is absent from the loaded dataset.
    #[error("missing column: '{column}' is not present in the data")]
    MissingColumn { column: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AnalysisError::MissingColumn {
            column: "loneliness".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "missing column: 'loneliness' is not present in the data"
        );
        assert!(AnalysisError::InvalidInput("n = 7".to_string())
            .to_string()
            .starts_with("invalid input"));
    }
}
