//! Schema validation for device rows.
//!
//! Two layers live here:
//!
//! - [`validate`] checks a JSON document against a JSON Schema (draft 7).
//!   It is used to vet schema documents before they are deserialized.
//! - [`validate_rows`] turns raw CSV rows into typed [`DeviceRecord`]s
//!   against a declared [`Schema`].
//!
//! # Row policy
//!
//! Validation is permissive: a malformed row is skipped and recorded as a
//! [`ValidationError`], and the run continues. Row-shape errors from the
//! parser land in the same list. The run fails only when the file had no
//! data rows ([`CsvError::EmptyFile`]) or when too many rows were skipped
//! ([`PipelineError::NoValidData`]).
//!
//! # Coercion
//!
//! | Type      | Accepted                                                   |
//! |-----------|------------------------------------------------------------|
//! | `string`  | any non-empty text                                         |
//! | `enum`    | a declared value, case-insensitive, stored as declared     |
//! | `boolean` | `true/false yes/no y/n 1/0 t/f on/off`, case-insensitive   |
//! | `numeric` | finite decimal number                                      |

use serde_json::Value;

use crate::error::{CsvError, CsvResult, PipelineError, PipelineResult, ValidationError};
use crate::models::{DeviceRecord, FieldSpec, FieldType, FieldValue, RawRow, Schema};

const TRUE_TOKENS: &[&str] = &["true", "yes", "y", "1", "t", "on"];
const FALSE_TOKENS: &[&str] = &["false", "no", "n", "0", "f", "off"];

/// Validate a JSON object against a JSON Schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation otherwise
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use devcov::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": {
///         "name": { "type": "string" }
///     }
/// });
///
/// assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
/// assert!(validate(&schema, &json!({ "age": 42 })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema definition: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// =============================================================================
// Row validation
// =============================================================================

/// How many skipped rows a run tolerates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SkipPolicy {
    /// Maximum share of skipped rows (0.0..=1.0). `None` only fails when
    /// no row validated at all.
    pub max_skip_ratio: Option<f64>,
}

impl SkipPolicy {
    fn check(&self, total: usize, skipped: usize) -> PipelineResult<()> {
        let too_many = match self.max_skip_ratio {
            _ if skipped == total => true,
            Some(ratio) => skipped as f64 / total as f64 > ratio,
            None => false,
        };
        if too_many {
            return Err(PipelineError::NoValidData { total, skipped });
        }
        Ok(())
    }
}

/// Output of a validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    pub records: Vec<DeviceRecord>,
    /// Skipped rows, in row order.
    pub errors: Vec<ValidationError>,
    /// Data rows seen, malformed ones included.
    pub total_rows: usize,
}

/// Parse a boolean token.
pub fn parse_boolean(raw: &str) -> Option<bool> {
    let token = raw.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Coerce a non-empty raw value to the field's declared type.
pub fn coerce(field: &FieldSpec, raw: &str) -> Result<FieldValue, String> {
    let raw = raw.trim();
    match &field.kind {
        FieldType::String => Ok(FieldValue::Text(raw.to_string())),
        FieldType::Enum { values } => values
            .iter()
            .find(|v| v.eq_ignore_ascii_case(raw))
            .map(|v| FieldValue::Text(v.clone()))
            .ok_or_else(|| format!("'{}' is not one of: {}", raw, values.join(", "))),
        FieldType::Boolean => parse_boolean(raw)
            .map(FieldValue::Bool)
            .ok_or_else(|| format!("'{}' is not a boolean", raw)),
        FieldType::Numeric => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(FieldValue::Number(n)),
            _ => Err(format!("'{}' is not a number", raw)),
        },
    }
}

/// Validate one row. The first failing field (in schema order) is reported.
pub fn validate_row(schema: &Schema, row: &RawRow) -> Result<DeviceRecord, ValidationError> {
    let mut values = Vec::with_capacity(schema.fields.len());

    for field in &schema.fields {
        let raw = row.get(&field.name).map(str::trim).unwrap_or("");

        if raw.is_empty() {
            if schema.is_required(field) {
                return Err(ValidationError::missing_field(row.row, &field.name));
            }
            continue;
        }

        let value = coerce(field, raw)
            .map_err(|message| ValidationError::type_mismatch(row.row, &field.name, message))?;
        values.push((field.name.clone(), value));
    }

    let id = row
        .get(&schema.identifier)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    Ok(DeviceRecord {
        row: row.row,
        id,
        values,
    })
}

/// Drain the row sequence, validating every row.
///
/// Structural parser errors abort; row-shape errors are collected.
pub fn validate_rows<I>(schema: &Schema, rows: I, policy: &SkipPolicy) -> PipelineResult<Validated>
where
    I: IntoIterator<Item = CsvResult<RawRow>>,
{
    let mut validated = Validated::default();

    for item in rows {
        validated.total_rows += 1;
        match item {
            Ok(row) => match validate_row(schema, &row) {
                Ok(record) => validated.records.push(record),
                Err(err) => validated.errors.push(err),
            },
            Err(e) => match e.row_error() {
                Some(err) => validated.errors.push(err),
                None => return Err(e.into()),
            },
        }
    }

    if validated.total_rows == 0 {
        return Err(CsvError::EmptyFile.into());
    }
    policy.check(validated.total_rows, validated.errors.len())?;

    Ok(validated)
}
