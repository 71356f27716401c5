//! Report module.
//!
//! This module turns validated records into reports:
//! - Coverage: two-field cross tabulation (count or presence)
//! - Analytics: per-group summaries of the remaining fields
//! - Cumulative: devices ranked by usage share up to a cutoff
//! - Format: serializable response shapes
//! - Pipeline: bytes in, formatted report out

pub mod analytics;
pub mod coverage;
pub mod cumulative;
pub mod format;
pub mod pipeline;

pub use analytics::{group_by, AttributeStats, GroupStats, GroupedAnalytics};
pub use coverage::{build_coverage, CellMode, CoverageMatrix, LabelOrder};
pub use cumulative::{
    cumulative_coverage, CumulativeCoverage, RankedDevice, DEFAULT_CUTOFF, DEFAULT_USAGE_FIELD,
};
pub use format::*;
pub use pipeline::*;
