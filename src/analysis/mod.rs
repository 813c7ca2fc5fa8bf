//! Aggregation over survey observations.
//!
//! Pure functions computing group means, metric rankings, comparison
//! baselines, trends and threshold alerts. Nothing here performs I/O.

pub mod aggregator;
pub mod alerts;
pub mod error;

pub use aggregator::*;
pub use alerts::*;
pub use error::AnalysisError;
