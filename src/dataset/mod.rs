//! Survey dataset loading and schema validation.
//!
//! The CSV file is read once at startup into an immutable [`Dataset`].
//! Column presence is checked here, once, and recorded in a
//! [`DatasetSchema`] that the rest of the program consults instead of
//! probing columns on its own.

use crate::analysis::AnalysisError;
use crate::models::{Metric, Observation, Period};
use anyhow::{Context, Result};
use csv::StringRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

const SCHOOL_ALIASES: &[&str] = &["school", "Skóli"];
const YEAR_ALIASES: &[&str] = &["year", "Ár"];

/// Which metric columns the loaded file carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSchema {
    present: [bool; Metric::COUNT],
}

impl DatasetSchema {
    /// Schema with every metric column present.
    #[cfg(test)]
    pub fn complete() -> Self {
        Self {
            present: [true; Metric::COUNT],
        }
    }

    /// Schema with exactly the given metric columns present.
    pub fn from_present(metrics: &[Metric]) -> Self {
        let mut present = [false; Metric::COUNT];
        for metric in metrics {
            present[metric.index()] = true;
        }
        Self { present }
    }

    /// Whether the metric's column exists.
    pub fn has_metric(&self, metric: Metric) -> bool {
        self.present[metric.index()]
    }

    /// Present metrics in declaration order.
    pub fn present_metrics(&self) -> Vec<Metric> {
        Metric::ALL
            .iter()
            .copied()
            .filter(|m| self.has_metric(*m))
            .collect()
    }

    /// Absent metrics in declaration order.
    pub fn missing_metrics(&self) -> Vec<Metric> {
        Metric::ALL
            .iter()
            .copied()
            .filter(|m| !self.has_metric(*m))
            .collect()
    }

    /// Whether the loneliness and anxiety columns used by the default
    /// alert rules are both available.
    pub fn has_alert_columns(&self) -> bool {
        self.has_metric(Metric::Loneliness) && self.has_metric(Metric::Anxiety)
    }
}

/// A data row that was skipped or partially read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowWarning {
    /// 1-based line number in the file (header is line 1).
    pub line: usize,
    pub message: String,
}

/// Immutable in-memory survey table.
#[derive(Debug, Clone)]
pub struct Dataset {
    source: String,
    rows: Vec<Observation>,
    schema: DatasetSchema,
    warnings: Vec<RowWarning>,
}

/// Column positions resolved from the header row.
struct ColumnMap {
    school: usize,
    year: usize,
    metrics: [Option<usize>; Metric::COUNT],
}

impl Dataset {
    /// Load a dataset from a CSV file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open data file: {}", path.display()))?;

        Self::from_reader(file, &path.display().to_string())
            .with_context(|| format!("Failed to load data file: {}", path.display()))
    }

    /// Load a dataset from any CSV reader. `source` names it in reports.
    pub fn from_reader<R: Read>(reader: R, source: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .context("Failed to read CSV header row")?
            .clone();
        let columns = resolve_columns(&headers)?;

        let present: Vec<Metric> = Metric::ALL
            .into_iter()
            .filter(|m| columns.metrics[m.index()].is_some())
            .collect();
        let schema = DatasetSchema::from_present(&present);
        for metric in schema.missing_metrics() {
            warn!("Column for '{}' not found in {}", metric.key(), source);
        }

        let mut rows = Vec::new();
        let mut warnings = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            let line = idx + 2;

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warnings.push(RowWarning {
                        line,
                        message: format!("CSV parse error: {}", e),
                    });
                    continue;
                }
            };

            match parse_row(&record, &columns, line, &mut warnings) {
                Ok(row) => rows.push(row),
                Err(message) => warnings.push(RowWarning { line, message }),
            }
        }

        for warning in &warnings {
            warn!("{} line {}: {}", source, warning.line, warning.message);
        }
        info!(
            "Loaded {} rows from {} ({} skipped or partial)",
            rows.len(),
            source,
            warnings.len()
        );

        Ok(Self {
            source: source.to_string(),
            rows,
            schema,
            warnings,
        })
    }

    /// Builds a dataset from rows already in memory.
    #[cfg(test)]
    pub fn from_rows(rows: Vec<Observation>, schema: DatasetSchema) -> Self {
        Self {
            source: "memory".to_string(),
            rows,
            schema,
            warnings: Vec::new(),
        }
    }

    /// Where the data was read from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All observations.
    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    /// Column availability.
    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    /// Rows skipped or partially read at load time.
    pub fn warnings(&self) -> &[RowWarning] {
        &self.warnings
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no observation was loaded.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct school names, sorted.
    pub fn schools(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.school.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.rows
            .iter()
            .map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct years with their survey period.
    pub fn periods(&self) -> Vec<(i32, Period)> {
        self.rows
            .iter()
            .map(|r| (r.year, r.period()))
            .collect::<BTreeMap<_, _>>()
            .into_iter()
            .collect()
    }

    /// Whether any row belongs to `school`.
    pub fn has_school(&self, school: &str) -> bool {
        self.rows.iter().any(|r| r.school == school)
    }
}

/// Lowercases and drops everything but letters and digits, so
/// "Screen Time", "screen_time" and "screen-time" compare equal.
fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn find_column(header_map: &HashMap<String, usize>, aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| header_map.get(&normalize_header(alias)).copied())
}

fn resolve_columns(headers: &StringRecord) -> Result<ColumnMap> {
    let mut header_map = HashMap::new();
    for (idx, name) in headers.iter().enumerate() {
        header_map.entry(normalize_header(name)).or_insert(idx);
    }
    debug!("CSV headers: {:?}", headers);

    let school = find_column(&header_map, SCHOOL_ALIASES).ok_or_else(|| {
        AnalysisError::MissingColumn {
            column: "school".to_string(),
        }
    })?;
    let year = find_column(&header_map, YEAR_ALIASES).ok_or_else(|| {
        AnalysisError::MissingColumn {
            column: "year".to_string(),
        }
    })?;

    let metrics = Metric::ALL.map(|m| find_column(&header_map, m.aliases()));

    Ok(ColumnMap {
        school,
        year,
        metrics,
    })
}

fn parse_row(
    record: &StringRecord,
    columns: &ColumnMap,
    line: usize,
    warnings: &mut Vec<RowWarning>,
) -> std::result::Result<Observation, String> {
    let school = record
        .get(columns.school)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing school name".to_string())?;

    let year_raw = record.get(columns.year).unwrap_or("");
    let year = parse_year(year_raw).ok_or_else(|| format!("invalid year '{}'", year_raw))?;

    let mut row = Observation::new(school, year);

    for metric in Metric::ALL {
        let Some(col) = columns.metrics[metric.index()] else {
            continue;
        };
        let raw = record.get(col).unwrap_or("");
        if raw.is_empty() {
            continue;
        }
        match parse_score(raw) {
            Some(value) => row.set_score(metric, Some(value)),
            None => warnings.push(RowWarning {
                line,
                message: format!("invalid {} value '{}', treated as blank", metric.key(), raw),
            }),
        }
    }

    Ok(row)
}

/// Accepts "2022" as well as a float export such as "2022.0".
fn parse_year(raw: &str) -> Option<i32> {
    if let Ok(year) = raw.parse::<i32>() {
        return Some(year);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value.abs() < i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}

/// Accepts a decimal comma as well as a decimal point.
fn parse_score(raw: &str) -> Option<f64> {
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_CSV: &str = "\
school,year,wellbeing,anxiety,loneliness,screen_time,teacher_relationship,school_satisfaction
Akurskóli,2022,6.0,3.0,2.5,4.0,7.0,6.5
Akurskóli,2023,7.0,3.5,3.0,4.5,7.5,7.0
Heiðarskóli,2022,5.0,4.5,5.5,5.0,6.0,5.5
";

    #[test]
    fn test_load_full_dataset() {
        let dataset = Dataset::from_reader(FULL_CSV.as_bytes(), "inline").unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.schema(), &DatasetSchema::complete());
        assert!(dataset.schema().has_alert_columns());
        assert_eq!(dataset.schools(), vec!["Akurskóli", "Heiðarskóli"]);
        assert_eq!(dataset.years(), vec![2022, 2023]);
        assert_eq!(dataset.rows()[2].score(Metric::Loneliness), Some(5.5));
        assert!(dataset.warnings().is_empty());
    }

    #[test]
    fn test_icelandic_headers() {
        let csv = "\
Skóli,Ár,Líðan,Kvíði,Einmanaleiki,Skjástund,Tengsl við kennara,Ánægja með skólann
Njarðvíkurskóli,2021,\"6,5\",3,2,4,7,6
";
        let dataset = Dataset::from_reader(csv.as_bytes(), "inline").unwrap();

        assert_eq!(dataset.schema(), &DatasetSchema::complete());
        let row = &dataset.rows()[0];
        assert_eq!(row.school, "Njarðvíkurskóli");
        assert_eq!(row.score(Metric::Wellbeing), Some(6.5));
        assert_eq!(row.score(Metric::TeacherRelationship), Some(7.0));
        assert_eq!(dataset.periods(), vec![(2021, Period::Fall)]);
    }

    #[test]
    fn test_missing_metric_column_degrades() {
        let csv = "\
school,year,wellbeing,anxiety
A,2022,6,3
";
        let dataset = Dataset::from_reader(csv.as_bytes(), "inline").unwrap();

        assert!(!dataset.schema().has_metric(Metric::Loneliness));
        assert!(!dataset.schema().has_alert_columns());
        assert_eq!(
            dataset.schema().present_metrics(),
            vec![Metric::Wellbeing, Metric::Anxiety]
        );
        assert_eq!(dataset.schema().missing_metrics().len(), 4);
        assert_eq!(dataset.rows()[0].score(Metric::Loneliness), None);
    }

    #[test]
    fn test_missing_school_column_fails() {
        let csv = "year,wellbeing\n2022,6\n";
        let err = Dataset::from_reader(csv.as_bytes(), "inline").unwrap_err();

        let cause = err.downcast_ref::<AnalysisError>();
        assert_eq!(
            cause,
            Some(&AnalysisError::MissingColumn {
                column: "school".to_string()
            })
        );
    }

    #[test]
    fn test_bad_rows_are_skipped_with_warnings() {
        let csv = "\
school,year,wellbeing
A,2022,6
,2022,5
B,twenty,4
C,2023.0,abc
D,2024,
";
        let dataset = Dataset::from_reader(csv.as_bytes(), "inline").unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.schools(), vec!["A", "C", "D"]);
        assert_eq!(dataset.rows()[1].year, 2023);
        assert_eq!(dataset.rows()[1].score(Metric::Wellbeing), None);

        let lines: Vec<usize> = dataset.warnings().iter().map(|w| w.line).collect();
        assert_eq!(lines, vec![3, 4, 5]);
        assert!(dataset.warnings()[1].message.contains("twenty"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CSV.as_bytes()).unwrap();

        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 3);
        assert!(dataset.has_school("Heiðarskóli"));
        assert!(!dataset.has_school("Nowhere"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Dataset::load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open data file"));
    }

    #[test]
    fn test_load_fixture() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/wellbeing_sample.csv");
        let dataset = Dataset::load(&path).unwrap();

        assert_eq!(dataset.schools().len(), 4);
        assert_eq!(dataset.years(), vec![2021, 2022, 2023, 2024]);
        assert!(dataset.schema().has_alert_columns());
        assert!(dataset.warnings().is_empty());
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Screen Time"), "screentime");
        assert_eq!(normalize_header("screen_time"), "screentime");
        assert_eq!(normalize_header(" Skóli "), "skóli");
        assert_eq!(normalize_header("ÁR"), "ár");
    }
}
