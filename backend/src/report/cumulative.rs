//! Cumulative usage coverage.
//!
//! Devices are ranked by a usage share (highest first) and a running total
//! is kept; a device belongs to the report while the running total stays
//! within the cutoff. With the default cutoff this answers "which devices
//! do we need to test to cover 90% of usage?".

use crate::models::{DeviceRecord, FieldValue};

/// Default share of usage the report should cover.
pub const DEFAULT_CUTOFF: f64 = 90.0;

/// Default numeric field holding each device's share of usage.
pub const DEFAULT_USAGE_FIELD: &str = "usage_percent";

/// Float slack when comparing a running total with the cutoff.
const CUTOFF_EPSILON: f64 = 1e-9;

/// One ranked device.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDevice {
    pub id: String,
    pub row: usize,
    pub usage: f64,
    pub cumulative: f64,
    /// Other present values, schema order.
    pub fields: Vec<(String, FieldValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeCoverage {
    pub usage_field: String,
    pub cutoff: f64,
    /// Usage summed over every record, included or not.
    pub total_usage: f64,
    pub devices: Vec<RankedDevice>,
}

/// Rank records by usage and keep those whose running total is within `cutoff`.
///
/// Ties keep their input order.
pub fn cumulative_coverage(
    records: &[DeviceRecord],
    identifier: &str,
    usage_field: &str,
    cutoff: f64,
) -> CumulativeCoverage {
    let mut ranked: Vec<(&DeviceRecord, f64)> = records
        .iter()
        .filter_map(|r| r.get(usage_field).and_then(FieldValue::as_number).map(|u| (r, u)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total_usage: f64 = ranked.iter().map(|(_, u)| u).sum();

    let mut running = 0.0;
    let mut devices = Vec::new();
    for (record, usage) in ranked {
        running += usage;
        if running > cutoff + CUTOFF_EPSILON {
            continue;
        }
        devices.push(RankedDevice {
            id: record.id.clone(),
            row: record.row,
            usage,
            cumulative: running,
            fields: record
                .values
                .iter()
                .filter(|(name, _)| name != identifier && name != usage_field)
                .cloned()
                .collect(),
        });
    }

    CumulativeCoverage {
        usage_field: usage_field.to_string(),
        cutoff,
        total_usage,
        devices,
    }
}
