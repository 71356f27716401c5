//! Error types for the devcov report pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - structural errors while reading the upload
//! - [`ValidationError`] - one skipped row (collected, never fatal on its own)
//! - [`ConfigError`] - bad request parameters, schema documents or settings
//! - [`PipelineError`] - top-level outcome of a report run
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Which injected size guard was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimit {
    /// Upload is larger than `limit` bytes.
    Bytes { limit: usize, actual: usize },
    /// Upload has more than `limit` data rows.
    Rows { limit: usize },
    /// Request body was cut off by the server's body limit.
    Body { limit: Option<usize> },
}

impl std::fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeLimit::Bytes { limit, actual } => {
                write!(f, "{} bytes exceeds the limit of {} bytes", actual, limit)
            }
            SizeLimit::Rows { limit } => write!(f, "more than {} data rows", limit),
            SizeLimit::Body { limit: Some(limit) } => {
                write!(f, "upload exceeds the limit of {} bytes", limit)
            }
            SizeLimit::Body { limit: None } => write!(f, "request body exceeds the server limit"),
        }
    }
}

/// Structural errors during CSV parsing.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Bytes could not be decoded with the requested encoding.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// No header, or a header without any data row.
    #[error("CSV file is empty")]
    EmptyFile,

    /// Duplicate or blank column names.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// A record with a different field count than the header.
    #[error("Row {row}: expected {expected} fields, found {found}")]
    RowShape {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// An injected size guard was exceeded.
    #[error("File too large: {0}")]
    FileTooLarge(SizeLimit),

    /// The CSV reader rejected a record.
    #[error("Row {row}: {message}")]
    Read { row: usize, message: String },
}

impl CsvError {
    /// The row error to collect for this failure, or `None` when it aborts the run.
    ///
    /// Only row-shape errors are collected with the row errors.
    pub fn row_error(&self) -> Option<ValidationError> {
        match *self {
            CsvError::RowShape { row, expected, found } => {
                Some(ValidationError::row_shape(row, expected, found))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Row Validation Errors
// =============================================================================

/// Reason a row was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowErrorKind {
    #[serde(rename = "RowShapeError")]
    RowShape,
    #[serde(rename = "MissingFieldError")]
    MissingField,
    #[serde(rename = "TypeMismatchError")]
    TypeMismatch,
}

/// One skipped row, addressed by its 1-based data row index (header excluded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub row: usize,
    pub column: Option<String>,
    pub reason: RowErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn missing_field(row: usize, column: &str) -> Self {
        Self {
            row,
            column: Some(column.to_string()),
            reason: RowErrorKind::MissingField,
            message: format!("required field '{}' is empty or absent", column),
        }
    }

    pub fn type_mismatch(row: usize, column: &str, message: impl Into<String>) -> Self {
        Self {
            row,
            column: Some(column.to_string()),
            reason: RowErrorKind::TypeMismatch,
            message: message.into(),
        }
    }

    pub fn row_shape(row: usize, expected: usize, found: usize) -> Self {
        Self {
            row,
            column: None,
            reason: RowErrorKind::RowShape,
            message: format!("expected {} fields, found {}", expected, found),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(col) => write!(f, "Row {}, column '{}': {}", self.row, col, self.message),
            None => write!(f, "Row {}: {}", self.row, self.message),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors in request parameters, schema documents or settings.
///
/// These are always reported before any parsing work begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A request names a field the schema does not declare.
    #[error("Unknown {role} field '{field}'")]
    UnknownField { role: &'static str, field: String },

    /// A request names a field of the wrong type.
    #[error("Field '{field}' must be {expected}")]
    WrongFieldType { field: String, expected: &'static str },

    /// The schema document is not usable.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A request parameter is out of range.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// An environment setting could not be parsed.
    #[error("Invalid setting {key}: {message}")]
    InvalidSetting { key: &'static str, message: String },

    /// Schema file could not be read.
    #[error("Cannot read schema file: {0}")]
    IoError(#[from] std::io::Error),

    /// Schema file is not valid JSON.
    #[error("Schema JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level report errors, returned by the `run_*` functions in
/// [`crate::report::pipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Request or schema configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Structural CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// The file had rows but too few of them validated.
    #[error("No valid data: {skipped} of {total} rows failed validation")]
    NoValidData { total: usize, skipped: usize },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
