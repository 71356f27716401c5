//! REST API types for frontend integration.
//!
//! Every report endpoint answers with the same envelope; only `report`
//! changes shape between coverage, analytics and cumulative runs.

use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{CsvError, PipelineError, ServerError};
use crate::parser::{CsvInfo, Delimiter, ParseOptions, TextEncoding};
use crate::report::{ReportOutcome, ReportStatus};

/// Parse settings accepted on every upload endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParseQuery {
    /// `auto`, `tab` or a single character (default `,`)
    pub delimiter: Option<String>,
    /// `utf-8`, `iso-8859-1`, `windows-1252` or `auto` (default `utf-8`)
    pub encoding: Option<String>,
}

impl ParseQuery {
    pub fn to_options(&self) -> Result<ParseOptions, ServerError> {
        let mut options = ParseOptions::default();
        if let Some(d) = &self.delimiter {
            options.delimiter = d.parse::<Delimiter>().map_err(ServerError::BadRequest)?;
        }
        if let Some(e) = &self.encoding {
            options.encoding = e.parse::<TextEncoding>().map_err(ServerError::BadRequest)?;
        }
        Ok(options)
    }
}

/// Response sent to frontend after a report run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse<R> {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" or "warning"
    pub status: String,

    /// RFC 3339 timestamp
    pub generated_at: String,

    pub report: R,

    pub metadata: ResponseMetadata,
}

/// Metadata about the run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub csv_info: CsvMetadata,
    pub validation: ValidationStats,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<CsvInfo> for CsvMetadata {
    fn from(info: CsvInfo) -> Self {
        Self {
            encoding: info.encoding,
            delimiter: info.delimiter.to_string(),
            row_count: info.row_count,
            columns: info.headers,
        }
    }
}

/// Validation statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub valid: usize,
    pub skipped: usize,
}

impl<R> From<ReportOutcome<R>> for ReportResponse<R> {
    fn from(outcome: ReportOutcome<R>) -> Self {
        let status = match outcome.status {
            ReportStatus::Complete => "ready",
            ReportStatus::Partial => "warning",
        };

        ReportResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            generated_at: now(),
            report: outcome.report,
            metadata: ResponseMetadata {
                csv_info: outcome.csv_info.into(),
                validation: ValidationStats {
                    valid: outcome.valid_count,
                    skipped: outcome.skipped_count,
                },
            },
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// HTTP status for a failed request.
pub fn status_code(error: &ServerError) -> StatusCode {
    match error {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Pipeline(PipelineError::Config(_)) => StatusCode::BAD_REQUEST,
        ServerError::Pipeline(PipelineError::Csv(CsvError::FileTooLarge(_))) => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        ServerError::Pipeline(PipelineError::Csv(CsvError::IoError(_))) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServerError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "generatedAt": now(),
        "error": error,
        "report": null
    })
}
