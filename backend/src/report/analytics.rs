//! Group validated records by one field and summarize the other fields.
//!
//! ```text
//! Records                            →  Groups (first-seen key order)
//! ┌──────────────────────────────┐     ┌─────────────────────────────────┐
//! │ A1  android  nfc=true        │     │ android  count=2                │
//! │ A2  ios      nfc=false       │  →  │   supports_nfc: {true: 2}       │
//! │ A3  android  nfc=true        │     ├─────────────────────────────────┤
//! └──────────────────────────────┘     │ ios      count=1                │
//!                                      │   supports_nfc: {false: 1}      │
//!                                      └─────────────────────────────────┘
//! ```
//!
//! Text, enum and boolean fields get a value distribution; numeric fields
//! get count, sum and mean. The identifier and the group key itself are not
//! summarized, and a field with no value in a group is left out of it.

use std::collections::HashMap;

use crate::models::{DeviceRecord, FieldType, FieldValue, Schema};

/// Summary of one field within one group.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeStats {
    /// Value label → count, first-seen order.
    Distribution(Vec<(String, u64)>),
    Numeric { count: u64, sum: f64 },
}

impl AttributeStats {
    pub fn mean(&self) -> Option<f64> {
        match self {
            AttributeStats::Numeric { count, sum } if *count > 0 => Some(sum / *count as f64),
            _ => None,
        }
    }
}

/// One group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub key: String,
    pub count: u64,
    /// Summarized fields, schema order.
    pub attributes: Vec<(String, AttributeStats)>,
}

/// All groups, first-seen key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedAnalytics {
    pub key_field: String,
    pub groups: Vec<GroupStats>,
}

impl GroupedAnalytics {
    /// Sum of group counts.
    pub fn total(&self) -> u64 {
        self.groups.iter().map(|g| g.count).sum()
    }
}

/// Partition records by the key field and summarize each partition.
pub fn group_by(records: &[DeviceRecord], schema: &Schema, key_field: &str) -> GroupedAnalytics {
    let summarized: Vec<(&str, bool)> = schema
        .fields
        .iter()
        .filter(|f| f.name != schema.identifier && f.name != key_field)
        .map(|f| (f.name.as_str(), f.kind == FieldType::Numeric))
        .collect();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut builders: Vec<GroupBuilder> = Vec::new();

    for record in records {
        let Some(key) = record.label(key_field) else {
            continue;
        };

        let i = match index.get(&key) {
            Some(&i) => i,
            None => {
                index.insert(key.clone(), builders.len());
                builders.push(GroupBuilder::new(key, &summarized));
                builders.len() - 1
            }
        };
        builders[i].add(record);
    }

    GroupedAnalytics {
        key_field: key_field.to_string(),
        groups: builders.into_iter().map(GroupBuilder::build).collect(),
    }
}

/// Accumulates one field's statistics.
enum Accumulator {
    Distribution {
        counts: Vec<(String, u64)>,
        index: HashMap<String, usize>,
    },
    Numeric {
        count: u64,
        sum: f64,
    },
}

impl Accumulator {
    fn new(numeric: bool) -> Self {
        if numeric {
            Accumulator::Numeric { count: 0, sum: 0.0 }
        } else {
            Accumulator::Distribution {
                counts: Vec::new(),
                index: HashMap::new(),
            }
        }
    }

    fn add(&mut self, value: &FieldValue) {
        match self {
            Accumulator::Numeric { count, sum } => {
                if let Some(n) = value.as_number() {
                    *count += 1;
                    *sum += n;
                }
            }
            Accumulator::Distribution { counts, index } => {
                let label = value.label();
                match index.get(&label) {
                    Some(&i) => counts[i].1 += 1,
                    None => {
                        index.insert(label.clone(), counts.len());
                        counts.push((label, 1));
                    }
                }
            }
        }
    }

    fn finish(self) -> Option<AttributeStats> {
        match self {
            Accumulator::Numeric { count: 0, .. } => None,
            Accumulator::Numeric { count, sum } => Some(AttributeStats::Numeric { count, sum }),
            Accumulator::Distribution { counts, .. } if counts.is_empty() => None,
            Accumulator::Distribution { counts, .. } => Some(AttributeStats::Distribution(counts)),
        }
    }
}

/// Builder for accumulating one group's records.
struct GroupBuilder {
    key: String,
    count: u64,
    fields: Vec<(String, Accumulator)>,
}

impl GroupBuilder {
    fn new(key: String, summarized: &[(&str, bool)]) -> Self {
        Self {
            key,
            count: 0,
            fields: summarized
                .iter()
                .map(|(name, numeric)| (name.to_string(), Accumulator::new(*numeric)))
                .collect(),
        }
    }

    fn add(&mut self, record: &DeviceRecord) {
        self.count += 1;
        for (name, acc) in self.fields.iter_mut() {
            if let Some(value) = record.get(name) {
                acc.add(value);
            }
        }
    }

    fn build(self) -> GroupStats {
        GroupStats {
            key: self.key,
            count: self.count,
            attributes: self
                .fields
                .into_iter()
                .filter_map(|(name, acc)| acc.finish().map(|stats| (name, stats)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldSpec;

    fn schema() -> Schema {
        Schema::new(
            "id",
            vec![
                FieldSpec::new("id", FieldType::String, true),
                FieldSpec::new("os", FieldType::String, false),
                FieldSpec::new("supports_nfc", FieldType::Boolean, false),
                FieldSpec::new("usage_percent", FieldType::Numeric, false),
            ],
        )
        .unwrap()
    }

    fn record(row: usize, os: &str, nfc: Option<bool>, usage: Option<f64>) -> DeviceRecord {
        let mut values = vec![
            ("id".to_string(), FieldValue::Text(format!("D{}", row))),
            ("os".to_string(), FieldValue::Text(os.into())),
        ];
        if let Some(b) = nfc {
            values.push(("supports_nfc".into(), FieldValue::Bool(b)));
        }
        if let Some(u) = usage {
            values.push(("usage_percent".into(), FieldValue::Number(u)));
        }
        DeviceRecord {
            row,
            id: format!("D{}", row),
            values,
        }
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let records = vec![
            record(1, "android", Some(true), None),
            record(2, "ios", Some(false), None),
            record(3, "android", Some(true), None),
        ];
        let grouped = group_by(&records, &schema(), "os");

        assert_eq!(grouped.groups.len(), 2);
        let android = &grouped.groups[0];
        assert_eq!(android.key, "android");
        assert_eq!(android.count, 2);
        assert_eq!(
            android.attributes,
            vec![(
                "supports_nfc".to_string(),
                AttributeStats::Distribution(vec![("true".into(), 2)])
            )]
        );
        assert_eq!(grouped.groups[1].key, "ios");
        assert_eq!(grouped.total(), 3);
    }

    #[test]
    fn test_numeric_summary() {
        let records = vec![
            record(1, "android", None, Some(10.0)),
            record(2, "android", None, Some(5.0)),
            record(3, "android", None, None),
        ];
        let grouped = group_by(&records, &schema(), "os");
        let (name, stats) = &grouped.groups[0].attributes[0];
        assert_eq!(name, "usage_percent");
        assert_eq!(stats, &AttributeStats::Numeric { count: 2, sum: 15.0 });
        assert_eq!(stats.mean(), Some(7.5));
    }

    #[test]
    fn test_group_by_boolean_key() {
        let records = vec![
            record(1, "android", Some(false), None),
            record(2, "ios", Some(true), None),
            record(3, "ios", Some(false), None),
        ];
        let grouped = group_by(&records, &schema(), "supports_nfc");
        let keys: Vec<_> = grouped.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["false", "true"]);
        assert_eq!(
            grouped.groups[0].attributes[0].1,
            AttributeStats::Distribution(vec![("android".into(), 1), ("ios".into(), 1)])
        );
    }

    #[test]
    fn test_empty_input_is_empty_result() {
        let grouped = group_by(&[], &schema(), "os");
        assert!(grouped.groups.is_empty());
        assert_eq!(grouped.total(), 0);
    }
}
