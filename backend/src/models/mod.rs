//! Domain models for the devcov report pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`Schema`] - Declared field set (name, type, required flag) and identifier field
//! - [`FieldSpec`] / [`FieldType`] - One declared column
//! - [`RawRow`] - One CSV record as raw strings, in header order
//! - [`DeviceRecord`] - One validated, typed device row
//! - [`FieldValue`] - A typed cell value

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};

/// JSON Schema that every schema document must satisfy.
const SCHEMA_DEFINITION: &str = include_str!("../../schemas/schema-definition.json");

/// Built-in device schema used when no schema file is configured.
const DEFAULT_DEVICE_SCHEMA: &str = include_str!("../../schemas/device-schema.json");

// =============================================================================
// Field Types
// =============================================================================

/// Declared type of a column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// Free text.
    String,
    /// One of a fixed set of values (matched case-insensitively).
    Enum { values: Vec<String> },
    /// Truthy/falsy token.
    Boolean,
    /// Decimal number.
    Numeric,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Enum { .. } => "enum",
            FieldType::Boolean => "boolean",
            FieldType::Numeric => "numeric",
        }
    }
}

/// One declared column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldType, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            required,
        }
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Explicit declared schema, checked once per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    /// Name of the device identifier field.
    pub identifier: String,
    /// Declared fields, in output order.
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    /// Build a schema and check its internal consistency.
    pub fn new(identifier: impl Into<String>, fields: Vec<FieldSpec>) -> ConfigResult<Self> {
        let schema = Self {
            identifier: identifier.into(),
            fields,
        };
        schema.check()?;
        Ok(schema)
    }

    /// The built-in device schema.
    pub fn default_device() -> ConfigResult<Self> {
        Self::from_json_str(DEFAULT_DEVICE_SCHEMA)
    }

    /// Parse a schema document, validating it against the schema definition first.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let document: serde_json::Value = serde_json::from_str(json)?;
        let definition: serde_json::Value = serde_json::from_str(SCHEMA_DEFINITION)?;

        crate::validation::validate(&definition, &document)
            .map_err(|errors| ConfigError::InvalidSchema(errors.join("; ")))?;

        let schema: Schema = serde_json::from_value(document)?;
        schema.check()?;
        Ok(schema)
    }

    /// Load a schema document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Look up a declared field.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field named by a request, failing with a configuration error.
    pub fn require_field(&self, role: &'static str, name: &str) -> ConfigResult<&FieldSpec> {
        self.field(name).ok_or_else(|| ConfigError::UnknownField {
            role,
            field: name.to_string(),
        })
    }

    /// Whether a field must be present in every valid record.
    pub fn is_required(&self, field: &FieldSpec) -> bool {
        field.required || field.name == self.identifier
    }

    /// Request-scoped copy in which the given fields are also required.
    pub fn requiring(&self, names: &[&str]) -> Schema {
        let mut scoped = self.clone();
        for field in scoped.fields.iter_mut() {
            if names.contains(&field.name.as_str()) {
                field.required = true;
            }
        }
        scoped
    }

    fn check(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ConfigError::InvalidSchema("field names must not be blank".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::InvalidSchema(format!(
                    "field '{}' is declared twice",
                    field.name
                )));
            }
            if let FieldType::Enum { values } = &field.kind {
                if values.is_empty() {
                    return Err(ConfigError::InvalidSchema(format!(
                        "enum field '{}' declares no values",
                        field.name
                    )));
                }
            }
        }

        match self.field(&self.identifier) {
            None => Err(ConfigError::InvalidSchema(format!(
                "identifier field '{}' is not declared",
                self.identifier
            ))),
            Some(f) if f.kind != FieldType::String => Err(ConfigError::InvalidSchema(format!(
                "identifier field '{}' must be a string",
                self.identifier
            ))),
            Some(_) => Ok(()),
        }
    }
}

// =============================================================================
// Raw Row
// =============================================================================

/// One CSV record as raw strings.
///
/// The header is shared between the rows of one upload.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based data row index, header excluded.
    pub row: usize,
    header: Arc<[String]>,
    values: Vec<String>,
}

impl RawRow {
    pub fn new(row: usize, header: Arc<[String]>, values: Vec<String>) -> Self {
        Self { row, header, values }
    }

    /// Raw value of a column, if the column exists.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// (column, value) pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

// =============================================================================
// Typed Values and Records
// =============================================================================

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Number(f64),
}

impl FieldValue {
    /// Canonical text used for matrix labels, group keys and distributions.
    pub fn label(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => format_number(*n),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Integral values render without a fraction ("4" rather than "4.0").
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A validated device row.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Data row index the record came from.
    pub row: usize,
    /// Device identifier, never empty.
    pub id: String,
    /// Present values, in schema order (the identifier included).
    pub values: Vec<(String, FieldValue)>,
}

impl DeviceRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    pub fn label(&self, field: &str) -> Option<String> {
        self.get(field).map(FieldValue::label)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_schema_loads() {
        let schema = Schema::default_device().unwrap();
        assert_eq!(schema.identifier, "id");
        assert_eq!(schema.field("supports_nfc").unwrap().kind, FieldType::Boolean);
        assert_eq!(schema.field("usage_percent").unwrap().kind, FieldType::Numeric);
        assert!(schema.is_required(schema.field("id").unwrap()));
    }

    #[test]
    fn test_schema_document_parsing() {
        let json = r#"{
            "identifier": "serial",
            "fields": [
                { "name": "serial", "type": "string", "required": true },
                { "name": "tier", "type": "enum", "values": ["gold", "silver"] },
                { "name": "ram_gb", "type": "numeric" }
            ]
        }"#;
        let schema = Schema::from_json_str(json).unwrap();
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(
            schema.field("tier").unwrap().kind,
            FieldType::Enum { values: vec!["gold".into(), "silver".into()] }
        );
        assert!(!schema.field("ram_gb").unwrap().required);
    }

    #[test]
    fn test_schema_document_rejected_by_definition() {
        let json = r#"{ "identifier": "id", "fields": [ { "name": "id", "type": "date" } ] }"#;
        assert!(matches!(
            Schema::from_json_str(json),
            Err(ConfigError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_schema_requires_declared_identifier() {
        let result = Schema::new("id", vec![FieldSpec::new("os", FieldType::String, true)]);
        assert!(matches!(result, Err(ConfigError::InvalidSchema(_))));
    }

    #[test]
    fn test_schema_rejects_duplicate_fields() {
        let result = Schema::new(
            "id",
            vec![
                FieldSpec::new("id", FieldType::String, true),
                FieldSpec::new("id", FieldType::String, false),
            ],
        );
        assert!(matches!(result, Err(ConfigError::InvalidSchema(_))));
    }

    #[test]
    fn test_requiring_marks_request_fields() {
        let schema = Schema::default_device().unwrap();
        assert!(!schema.field("os").unwrap().required);
        let scoped = schema.requiring(&["os"]);
        assert!(scoped.field("os").unwrap().required);
        assert!(!schema.field("os").unwrap().required);
    }

    #[test]
    fn test_schema_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{ "identifier": "id", "fields": [ { "name": "id", "type": "string" } ] }"#,
        )
        .unwrap();
        let schema = Schema::from_file(&path).unwrap();
        assert_eq!(schema.identifier, "id");
    }

    #[test]
    fn test_value_labels() {
        assert_eq!(FieldValue::Bool(true).label(), "true");
        assert_eq!(FieldValue::Number(4.0).label(), "4");
        assert_eq!(FieldValue::Number(2.5).label(), "2.5");
        assert_eq!(FieldValue::Text("ios".into()).label(), "ios");
    }

    #[test]
    fn test_raw_row_lookup() {
        let header: Arc<[String]> = vec!["id".to_string(), "os".to_string()].into();
        let row = RawRow::new(1, header, vec!["A1".into(), "android".into()]);
        assert_eq!(row.get("os"), Some("android"));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.iter().count(), 2);
    }
}
