//! Dashboard assembly and rendering.

pub mod dashboard;
pub mod generator;

pub use dashboard::{build_dashboard, Dashboard, DashboardSettings, Selection, SelectionOptions};
pub use generator::{generate_json_report, generate_markdown_report, generate_options_listing};
