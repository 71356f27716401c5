//! Response shapes for the reports.
//!
//! The formatter only renders; label, group and attribute order is whatever
//! the builders produced. Maps are serialized in insertion order.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::analytics::{AttributeStats, GroupedAnalytics};
use super::coverage::{CellMode, CoverageMatrix};
use super::cumulative::CumulativeCoverage;
use crate::error::ValidationError;
use crate::models::FieldValue;

/// A map that serializes its entries in the order they were inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// =============================================================================
// Coverage
// =============================================================================

/// A count in count mode, a flag in presence mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Count(u64),
    Present(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    pub matrix: Vec<Vec<CellValue>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

pub fn format_coverage(matrix: &CoverageMatrix, errors: Vec<ValidationError>) -> CoverageReport {
    let render = |n: u64| match matrix.mode {
        CellMode::Count => CellValue::Count(n),
        CellMode::Presence => CellValue::Present(n > 0),
    };

    CoverageReport {
        row_labels: matrix.row_labels.clone(),
        column_labels: matrix.column_labels.clone(),
        matrix: matrix
            .rows()
            .map(|row| row.iter().map(|&n| render(n)).collect())
            .collect(),
        errors,
    }
}

// =============================================================================
// Grouped analytics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeReport {
    Distribution(OrderedMap<u64>),
    Numeric { count: u64, sum: f64, mean: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub key: String,
    pub count: u64,
    pub attributes: OrderedMap<AttributeReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub groups: Vec<GroupReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

fn attribute_report(stats: &AttributeStats) -> AttributeReport {
    match stats {
        AttributeStats::Distribution(counts) => AttributeReport::Distribution(OrderedMap(counts.clone())),
        AttributeStats::Numeric { count, sum } => AttributeReport::Numeric {
            count: *count,
            sum: *sum,
            mean: stats.mean().unwrap_or(0.0),
        },
    }
}

pub fn format_analytics(analytics: &GroupedAnalytics, errors: Vec<ValidationError>) -> AnalyticsReport {
    AnalyticsReport {
        groups: analytics
            .groups
            .iter()
            .map(|g| GroupReport {
                key: g.key.clone(),
                count: g.count,
                attributes: OrderedMap(
                    g.attributes
                        .iter()
                        .map(|(name, stats)| (name.clone(), attribute_report(stats)))
                        .collect(),
                ),
            })
            .collect(),
        errors,
    }
}

// =============================================================================
// Cumulative coverage
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDeviceReport {
    pub id: String,
    pub usage: f64,
    pub cumulative: f64,
    pub fields: OrderedMap<FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeReport {
    pub usage_field: String,
    pub cutoff: f64,
    pub total_usage: f64,
    pub devices: Vec<RankedDeviceReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

pub fn format_cumulative(coverage: &CumulativeCoverage, errors: Vec<ValidationError>) -> CumulativeReport {
    CumulativeReport {
        usage_field: coverage.usage_field.clone(),
        cutoff: coverage.cutoff,
        total_usage: coverage.total_usage,
        devices: coverage
            .devices
            .iter()
            .map(|d| RankedDeviceReport {
                id: d.id.clone(),
                usage: d.usage,
                cumulative: d.cumulative,
                fields: OrderedMap(d.fields.clone()),
            })
            .collect(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceRecord, FieldSpec, FieldType, Schema};
    use crate::report::analytics::group_by;
    use crate::report::coverage::{build_coverage, LabelOrder};
    use serde_json::json;

    fn records() -> Vec<DeviceRecord> {
        [("A1", "android", true, 3.0), ("A2", "ios", false, 1.0), ("A3", "android", true, 2.0)]
            .iter()
            .enumerate()
            .map(|(i, (id, os, nfc, ram))| DeviceRecord {
                row: i + 1,
                id: id.to_string(),
                values: vec![
                    ("id".into(), FieldValue::Text(id.to_string())),
                    ("os".into(), FieldValue::Text(os.to_string())),
                    ("supports_nfc".into(), FieldValue::Bool(*nfc)),
                    ("ram_gb".into(), FieldValue::Number(*ram)),
                ],
            })
            .collect()
    }

    #[test]
    fn test_coverage_count_shape() {
        let m = build_coverage(&records(), "os", "supports_nfc", CellMode::Count, LabelOrder::FirstSeen);
        let json = serde_json::to_value(format_coverage(&m, vec![])).unwrap();
        assert_eq!(
            json,
            json!({
                "row_labels": ["android", "ios"],
                "column_labels": ["true", "false"],
                "matrix": [[2, 0], [0, 1]]
            })
        );
    }

    #[test]
    fn test_coverage_presence_cells_are_booleans() {
        let m = build_coverage(&records(), "os", "supports_nfc", CellMode::Presence, LabelOrder::FirstSeen);
        let json = serde_json::to_value(format_coverage(&m, vec![])).unwrap();
        assert_eq!(json["matrix"], json!([[true, false], [false, true]]));
    }

    #[test]
    fn test_errors_listed_when_present() {
        let m = build_coverage(&records(), "os", "supports_nfc", CellMode::Count, LabelOrder::FirstSeen);
        let errors = vec![ValidationError::type_mismatch(4, "supports_nfc", "'maybe' is not a boolean")];
        let json = serde_json::to_value(format_coverage(&m, errors)).unwrap();
        assert_eq!(json["errors"][0]["row"], 4);
        assert_eq!(json["errors"][0]["reason"], "TypeMismatchError");
    }

    #[test]
    fn test_analytics_shape_and_order() {
        let schema = Schema::new(
            "id",
            vec![
                FieldSpec::new("id", FieldType::String, true),
                FieldSpec::new("os", FieldType::String, true),
                FieldSpec::new("supports_nfc", FieldType::Boolean, false),
                FieldSpec::new("ram_gb", FieldType::Numeric, false),
            ],
        )
        .unwrap();
        let grouped = group_by(&records(), &schema, "os");
        let report = format_analytics(&grouped, vec![]);

        let text = serde_json::to_string(&report).unwrap();
        assert!(text.find("supports_nfc").unwrap() < text.find("ram_gb").unwrap());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["groups"][0]["key"], "android");
        assert_eq!(json["groups"][0]["attributes"]["supports_nfc"], json!({ "true": 2 }));
        assert_eq!(
            json["groups"][0]["attributes"]["ram_gb"],
            json!({ "count": 2, "sum": 5.0, "mean": 2.5 })
        );
        assert!(json.get("errors").is_none());
    }
}
