//! # Devcov - device coverage reports from CSV
//!
//! Devcov reads device inventories exported as CSV, validates every row
//! against a typed schema and produces coverage matrices, grouped analytics
//! and cumulative usage reports. Bad rows are reported, never fatal.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Validator  │────▶│   Reports   │
//! │  (bytes)    │     │  (raw rows) │     │  (schema)   │     │  (JSON)     │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use devcov::{run_analytics, AnalyticsRequest, EngineOptions, Schema, SilentLog};
//!
//! let schema = Schema::default_device()?;
//! let outcome = run_analytics(&bytes, &schema, &AnalyticsRequest::new("os"), &EngineOptions::default(), &SilentLog)?;
//! println!("{} groups, {} rows skipped", outcome.report.groups.len(), outcome.skipped_count);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Schema, raw rows and typed records
//! - [`parser`] - CSV decoding and row reading
//! - [`validation`] - Row validation and coercion
//! - [`report`] - Report builders, formatter and pipeline
//! - [`config`] - Environment settings
//! - [`api`] - HTTP API server and log sinks

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Reports
pub mod report;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, PipelineError, RowErrorKind, ServerError, SizeLimit, ValidationError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{DeviceRecord, FieldSpec, FieldType, FieldValue, RawRow, Schema};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, format_delimiter, open, parse_bytes,
    parse_file, CsvInfo, Delimiter, Limits, ParseOptions, ParseResult, RawRows, TextEncoding,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate_row, validate_rows, SkipPolicy, Validated};

// =============================================================================
// Re-exports - Reports
// =============================================================================

pub use report::{
    build_coverage, cumulative_coverage, group_by, run_analytics, run_coverage, run_cumulative,
    AnalyticsReport, AnalyticsRequest, CellMode, CoverageMatrix, CoverageReport,
    CoverageRequest, CumulativeReport, CumulativeRequest, EngineOptions, GroupedAnalytics,
    LabelOrder, ReportOutcome, ReportStatus,
};

// =============================================================================
// Re-exports - Config & API
// =============================================================================

pub use api::logs::{ConsoleLog, LogBroadcaster, LogEntry, LogLevel, LogSink, SilentLog};
pub use api::types::{error_response, ReportResponse};
pub use config::EngineConfig;

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
