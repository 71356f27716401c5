//! High-level report API: bytes in, report plus skipped rows out.
//!
//! Every run follows the same steps:
//!
//! 1. Check the request against the schema (before any parsing)
//! 2. Decode and read the header
//! 3. Validate every row against a request-scoped schema
//! 4. Build the report and format it
//!
//! # Example
//!
//! ```rust,ignore
//! use devcov::{run_coverage, CoverageRequest, CellMode, LabelOrder, EngineOptions, Schema, SilentLog};
//!
//! let schema = Schema::default_device()?;
//! let request = CoverageRequest::new("os", "supports_nfc", CellMode::Count, LabelOrder::FirstSeen);
//! let outcome = run_coverage(bytes, &schema, &request, &EngineOptions::default(), &SilentLog)?;
//! println!("{:?}", outcome.report.matrix);
//! ```

use serde::{Deserialize, Serialize};

use super::analytics::group_by;
use super::coverage::{build_coverage, CellMode, LabelOrder};
use super::cumulative::{cumulative_coverage, DEFAULT_CUTOFF, DEFAULT_USAGE_FIELD};
use super::format::{
    format_analytics, format_coverage, format_cumulative, AnalyticsReport, CoverageReport,
    CumulativeReport,
};
use crate::api::logs::LogSink;
use crate::error::{ConfigError, ConfigResult, PipelineResult};
use crate::models::{FieldType, Schema};
use crate::parser::{format_delimiter, open, CsvInfo, ParseOptions};
use crate::validation::{validate_rows, SkipPolicy, Validated};

/// Per-run engine settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineOptions {
    pub parse: ParseOptions,
    pub policy: SkipPolicy,
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRequest {
    pub row_field: String,
    pub column_field: String,
    pub mode: CellMode,
    #[serde(default)]
    pub order: LabelOrder,
}

impl CoverageRequest {
    pub fn new(
        row_field: impl Into<String>,
        column_field: impl Into<String>,
        mode: CellMode,
        order: LabelOrder,
    ) -> Self {
        Self {
            row_field: row_field.into(),
            column_field: column_field.into(),
            mode,
            order,
        }
    }

    fn check(&self, schema: &Schema) -> ConfigResult<()> {
        schema.require_field("row dimension", &self.row_field)?;
        schema.require_field("column dimension", &self.column_field)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRequest {
    pub group_by: String,
}

impl AnalyticsRequest {
    pub fn new(group_by: impl Into<String>) -> Self {
        Self { group_by: group_by.into() }
    }

    fn check(&self, schema: &Schema) -> ConfigResult<()> {
        schema.require_field("group key", &self.group_by).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeRequest {
    #[serde(default = "default_usage_field")]
    pub usage_field: String,
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
}

fn default_usage_field() -> String {
    DEFAULT_USAGE_FIELD.to_string()
}

fn default_cutoff() -> f64 {
    DEFAULT_CUTOFF
}

impl Default for CumulativeRequest {
    fn default() -> Self {
        Self {
            usage_field: default_usage_field(),
            cutoff: default_cutoff(),
        }
    }
}

impl CumulativeRequest {
    fn check(&self, schema: &Schema) -> ConfigResult<()> {
        let field = schema.require_field("usage", &self.usage_field)?;
        if field.kind != FieldType::Numeric {
            return Err(ConfigError::WrongFieldType {
                field: self.usage_field.clone(),
                expected: "numeric",
            });
        }
        if !self.cutoff.is_finite() || self.cutoff < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "cutoff",
                message: format!("{} is not a finite, non-negative number", self.cutoff),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Success code at the core boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Every row validated.
    Complete,
    /// Some rows were skipped; at least one validated.
    Partial,
}

/// A computed report and what it was computed from.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome<R> {
    pub report: R,
    pub status: ReportStatus,
    pub csv_info: CsvInfo,
    pub valid_count: usize,
    pub skipped_count: usize,
}

impl<R> ReportOutcome<R> {
    fn new(report: R, validated: &Validated, csv_info: CsvInfo) -> Self {
        let skipped_count = validated.errors.len();
        Self {
            report,
            status: if skipped_count == 0 {
                ReportStatus::Complete
            } else {
                ReportStatus::Partial
            },
            csv_info,
            valid_count: validated.records.len(),
            skipped_count,
        }
    }
}

// =============================================================================
// Runs
// =============================================================================

/// Cross-tabulate two fields.
pub fn run_coverage(
    bytes: &[u8],
    schema: &Schema,
    request: &CoverageRequest,
    options: &EngineOptions,
    log: &dyn LogSink,
) -> PipelineResult<ReportOutcome<CoverageReport>> {
    request.check(schema)?;
    let scoped = schema.requiring(&[request.row_field.as_str(), request.column_field.as_str()]);
    let (validated, csv_info) = ingest(bytes, &scoped, options, log)?;

    log.info(format!(
        "🧮 Building coverage matrix: {} × {} ({:?}, {:?})",
        request.row_field, request.column_field, request.mode, request.order
    ));
    let matrix = build_coverage(
        &validated.records,
        &request.row_field,
        &request.column_field,
        request.mode,
        request.order,
    );
    log.success(format!(
        "{} rows × {} columns",
        matrix.row_labels.len(),
        matrix.column_labels.len()
    ));

    let report = format_coverage(&matrix, validated.errors.clone());
    Ok(ReportOutcome::new(report, &validated, csv_info))
}

/// Group by one field and summarize the rest.
pub fn run_analytics(
    bytes: &[u8],
    schema: &Schema,
    request: &AnalyticsRequest,
    options: &EngineOptions,
    log: &dyn LogSink,
) -> PipelineResult<ReportOutcome<AnalyticsReport>> {
    request.check(schema)?;
    let scoped = schema.requiring(&[request.group_by.as_str()]);
    let (validated, csv_info) = ingest(bytes, &scoped, options, log)?;

    log.info(format!("📦 Grouping by {}...", request.group_by));
    let grouped = group_by(&validated.records, &scoped, &request.group_by);
    log.success(format!("{} groups", grouped.groups.len()));

    let report = format_analytics(&grouped, validated.errors.clone());
    Ok(ReportOutcome::new(report, &validated, csv_info))
}

/// Rank devices by usage share and keep those inside the cutoff.
pub fn run_cumulative(
    bytes: &[u8],
    schema: &Schema,
    request: &CumulativeRequest,
    options: &EngineOptions,
    log: &dyn LogSink,
) -> PipelineResult<ReportOutcome<CumulativeReport>> {
    request.check(schema)?;
    let scoped = schema.requiring(&[request.usage_field.as_str()]);
    let (validated, csv_info) = ingest(bytes, &scoped, options, log)?;

    log.info(format!(
        "📈 Ranking by {} (cutoff {}%)...",
        request.usage_field, request.cutoff
    ));
    let coverage = cumulative_coverage(
        &validated.records,
        &scoped.identifier,
        &request.usage_field,
        request.cutoff,
    );
    log.success(format!(
        "{} devices cover {:.2} of {:.2}",
        coverage.devices.len(),
        coverage.devices.last().map(|d| d.cumulative).unwrap_or(0.0),
        coverage.total_usage
    ));

    let report = format_cumulative(&coverage, validated.errors.clone());
    Ok(ReportOutcome::new(report, &validated, csv_info))
}

/// Parse and validate, logging along the way.
fn ingest(
    bytes: &[u8],
    schema: &Schema,
    options: &EngineOptions,
    log: &dyn LogSink,
) -> PipelineResult<(Validated, CsvInfo)> {
    log.info(format!("📖 Reading CSV ({} bytes)...", bytes.len()));
    let mut rows = open(bytes, &options.parse)?;
    let info = rows.info();
    log.success(format!("Encoding: {}", info.encoding));
    log.success(format!("Delimiter: '{}'", format_delimiter(info.delimiter)));
    log.info(format!("📋 CSV has {} columns:", info.headers.len()));
    for (i, col) in info.headers.iter().enumerate() {
        log.info_indent(format!("[{:2}] {}", i + 1, col), 1);
    }

    for field in schema.fields.iter().filter(|f| schema.is_required(f)) {
        if !info.headers.contains(&field.name) {
            log.warning(format!("Required column '{}' is not in the header", field.name));
        }
    }

    log.info("✔️  Validating rows...");
    let result = validate_rows(schema, rows.by_ref(), &options.policy);
    let info = rows.info();

    let validated = match result {
        Ok(v) => v,
        Err(e) => {
            log.error(e.to_string());
            return Err(e);
        }
    };

    if validated.errors.is_empty() {
        log.success(format!("All {} rows valid", validated.records.len()));
    } else {
        log.success(format!("Valid: {}", validated.records.len()));
        log.warning(format!("Skipped: {}", validated.errors.len()));
        for err in validated.errors.iter().take(5) {
            log.info_indent(err.to_string(), 1);
        }
    }

    Ok((validated, info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::logs::SilentLog;
    use crate::error::{CsvError, PipelineError, RowErrorKind};
    use crate::models::FieldSpec;
    use crate::parser::Limits;
    use serde_json::json;

    const SAMPLE: &str = "id,os,supports_nfc\nA1,android,true\nA2,ios,false\nA3,android,true";

    fn schema() -> Schema {
        Schema::default_device().unwrap()
    }

    fn coverage(csv: &str, mode: CellMode) -> PipelineResult<ReportOutcome<CoverageReport>> {
        let request = CoverageRequest::new("os", "supports_nfc", mode, LabelOrder::FirstSeen);
        run_coverage(csv.as_bytes(), &schema(), &request, &EngineOptions::default(), &SilentLog)
    }

    fn analytics(csv: &str, key: &str) -> PipelineResult<ReportOutcome<AnalyticsReport>> {
        run_analytics(
            csv.as_bytes(),
            &schema(),
            &AnalyticsRequest::new(key),
            &EngineOptions::default(),
            &SilentLog,
        )
    }

    #[test]
    fn test_coverage_scenario() {
        let outcome = coverage(SAMPLE, CellMode::Count).unwrap();
        assert_eq!(outcome.status, ReportStatus::Complete);
        assert_eq!(
            serde_json::to_value(&outcome.report).unwrap(),
            json!({
                "row_labels": ["android", "ios"],
                "column_labels": ["true", "false"],
                "matrix": [[2, 0], [0, 1]]
            })
        );
        assert_eq!(outcome.csv_info.row_count, 3);
    }

    #[test]
    fn test_analytics_scenario() {
        let outcome = analytics(SAMPLE, "os").unwrap();
        assert_eq!(
            serde_json::to_value(&outcome.report).unwrap(),
            json!({
                "groups": [
                    { "key": "android", "count": 2, "attributes": { "supports_nfc": { "true": 2 } } },
                    { "key": "ios", "count": 1, "attributes": { "supports_nfc": { "false": 1 } } }
                ]
            })
        );
    }

    #[test]
    fn test_non_boolean_row_is_skipped_and_reported() {
        let csv = "id,os,supports_nfc\nA1,android,true\nA2,ios,maybe\nA3,android,true";
        let outcome = coverage(csv, CellMode::Count).unwrap();
        assert_eq!(outcome.status, ReportStatus::Partial);
        assert_eq!(outcome.valid_count, 2);
        assert_eq!(outcome.report.row_labels, vec!["android"]);
        assert_eq!(outcome.report.column_labels, vec!["true"]);

        let err = &outcome.report.errors[0];
        assert_eq!(err.row, 2);
        assert_eq!(err.column.as_deref(), Some("supports_nfc"));
        assert_eq!(err.reason, RowErrorKind::TypeMismatch);

        let grouped = analytics(csv, "os").unwrap();
        assert_eq!(grouped.report.groups.len(), 1);
        assert_eq!(grouped.report.groups[0].count, 2);
    }

    #[test]
    fn test_all_empty_record_is_reported_not_dropped() {
        let csv = "id,os,supports_nfc\nA1,android,true\n,,\nA3,ios,false";
        let outcome = analytics(csv, "os").unwrap();
        assert_eq!(outcome.status, ReportStatus::Partial);
        assert_eq!(outcome.valid_count, 2);
        assert_eq!(outcome.skipped_count, 1);
        assert_eq!(outcome.csv_info.row_count, 3);

        let err = &outcome.report.errors[0];
        assert_eq!(err.row, 2);
        assert_eq!(err.column.as_deref(), Some("id"));
        assert_eq!(err.reason, RowErrorKind::MissingField);
    }

    #[test]
    fn test_count_conservation_and_group_totals() {
        let mut csv = String::from("id,os,supports_nfc,form_factor\n");
        for i in 0..40 {
            let os = ["android", "ios", "harmony", "kaios"][i % 4];
            let nfc = if i % 3 == 0 { "yes" } else { "no" };
            let ff = if i % 5 == 0 { "tablet" } else { "phone" };
            let bad = if i % 7 == 0 { "?" } else { nfc };
            csv.push_str(&format!("D{},{},{},{}\n", i, os, bad, ff));
        }

        let cov = coverage(&csv, CellMode::Count).unwrap();
        let cell_sum: u64 = cov
            .report
            .matrix
            .iter()
            .flatten()
            .map(|c| match c {
                crate::report::format::CellValue::Count(n) => *n,
                crate::report::format::CellValue::Present(_) => 0,
            })
            .sum();
        assert_eq!(cell_sum as usize, cov.valid_count);
        assert_eq!(cov.valid_count + cov.skipped_count, 40);

        let grouped = analytics(&csv, "form_factor").unwrap();
        let group_sum: u64 = grouped.report.groups.iter().map(|g| g.count).sum();
        assert_eq!(group_sum as usize, grouped.valid_count);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let csv = "id,os,supports_nfc\nB,ios,true\nA,android,maybe\nC,tizen,false\nD,ios,false";
        let first = serde_json::to_string(&coverage(csv, CellMode::Presence).unwrap().report).unwrap();
        let second = serde_json::to_string(&coverage(csv, CellMode::Presence).unwrap().report).unwrap();
        assert_eq!(first, second);

        let a = serde_json::to_string(&analytics(csv, "os").unwrap().report).unwrap();
        let b = serde_json::to_string(&analytics(csv, "os").unwrap().report).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_header_fails() {
        let result = coverage("id,os,os\nA1,android,true", CellMode::Count);
        assert!(matches!(result, Err(PipelineError::Csv(CsvError::MalformedHeader(_)))));
    }

    #[test]
    fn test_header_only_is_empty_file() {
        let result = analytics("id,os,supports_nfc\n", "os");
        assert!(matches!(result, Err(PipelineError::Csv(CsvError::EmptyFile))));
    }

    #[test]
    fn test_every_row_missing_required_field() {
        let result = analytics("id,os,supports_nfc\n,android,true\n,ios,false", "os");
        assert!(matches!(
            result,
            Err(PipelineError::NoValidData { total: 2, skipped: 2 })
        ));
    }

    #[test]
    fn test_dimension_is_required_for_the_run() {
        let csv = "id,os,supports_nfc\nA1,android,true\nA2,,false";
        let outcome = coverage(csv, CellMode::Count).unwrap();
        assert_eq!(outcome.valid_count, 1);
        assert_eq!(outcome.report.errors[0].reason, RowErrorKind::MissingField);
        assert_eq!(outcome.report.errors[0].column.as_deref(), Some("os"));
    }

    #[test]
    fn test_unknown_field_fails_before_parsing() {
        let request = CoverageRequest::new("vendor", "os", CellMode::Count, LabelOrder::FirstSeen);
        // Would be a malformed header if it were parsed.
        let result = run_coverage(b"id,id\n", &schema(), &request, &EngineOptions::default(), &SilentLog);
        assert!(matches!(
            result,
            Err(PipelineError::Config(ConfigError::UnknownField { .. }))
        ));
    }

    #[test]
    fn test_file_too_large() {
        let options = EngineOptions {
            parse: ParseOptions {
                limits: Limits { max_bytes: None, max_rows: Some(2) },
                ..Default::default()
            },
            ..Default::default()
        };
        let request = AnalyticsRequest::new("os");
        let result = run_analytics(SAMPLE.as_bytes(), &schema(), &request, &options, &SilentLog);
        assert!(matches!(result, Err(PipelineError::Csv(CsvError::FileTooLarge(_)))));
    }

    #[test]
    fn test_alphabetical_coverage() {
        let request = CoverageRequest::new("os", "supports_nfc", CellMode::Count, LabelOrder::Alphabetical);
        let outcome =
            run_coverage(SAMPLE.as_bytes(), &schema(), &request, &EngineOptions::default(), &SilentLog)
                .unwrap();
        assert_eq!(outcome.report.column_labels, vec!["false", "true"]);
        assert_eq!(
            serde_json::to_value(&outcome.report.matrix).unwrap(),
            json!([[0, 2], [1, 0]])
        );
    }

    #[test]
    fn test_cumulative_run() {
        let csv = "id,device_model,os_version,usage_percent\n\
                   d1,Pixel 8,14,20\nd2,Galaxy S23,14,55\nd3,iPhone 15,17,18\nd4,Moto G,13,7";
        let outcome = run_cumulative(
            csv.as_bytes(),
            &schema(),
            &CumulativeRequest::default(),
            &EngineOptions::default(),
            &SilentLog,
        )
        .unwrap();
        let ids: Vec<_> = outcome.report.devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d2", "d1"]);
        assert_eq!(outcome.report.total_usage, 100.0);
        assert_eq!(
            outcome.report.devices[0].fields.get("device_model"),
            Some(&crate::models::FieldValue::Text("Galaxy S23".into()))
        );
    }

    #[test]
    fn test_cumulative_requires_numeric_usage() {
        let request = CumulativeRequest {
            usage_field: "os".into(),
            cutoff: 90.0,
        };
        let result = run_cumulative(SAMPLE.as_bytes(), &schema(), &request, &EngineOptions::default(), &SilentLog);
        assert!(matches!(
            result,
            Err(PipelineError::Config(ConfigError::WrongFieldType { .. }))
        ));

        let custom = Schema::new(
            "id",
            vec![
                FieldSpec::new("id", FieldType::String, true),
                FieldSpec::new("share", FieldType::Numeric, false),
            ],
        )
        .unwrap();
        let negative = CumulativeRequest { usage_field: "share".into(), cutoff: -1.0 };
        let result = run_cumulative(b"id,share\na,1", &custom, &negative, &EngineOptions::default(), &SilentLog);
        assert!(matches!(
            result,
            Err(PipelineError::Config(ConfigError::InvalidParameter { .. }))
        ));
    }
}
