//! Engine settings from the environment.
//!
//! | Variable                | Meaning                                   | Default          |
//! |-------------------------|-------------------------------------------|------------------|
//! | `DEVCOV_MAX_BYTES`      | Largest accepted upload, in bytes         | unlimited        |
//! | `DEVCOV_MAX_ROWS`       | Largest accepted number of data rows      | unlimited        |
//! | `DEVCOV_MAX_SKIP_RATIO` | Share of rows allowed to fail (0.0..=1.0) | only all-failed  |
//! | `DEVCOV_SCHEMA`         | Path to a schema JSON document            | built-in devices |
//! | `DEVCOV_PORT`           | HTTP port for `devcov serve`              | 3000             |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::models::Schema;
use crate::parser::{Limits, ParseOptions};
use crate::report::EngineOptions;
use crate::validation::SkipPolicy;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub limits: Limits,
    pub max_skip_ratio: Option<f64>,
    pub schema_path: Option<PathBuf>,
    pub port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            max_skip_ratio: None,
            schema_path: None,
            port: DEFAULT_PORT,
        }
    }
}

impl EngineConfig {
    /// Read settings from the process environment, loading `.env` first.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`; unset and blank values keep their default.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_skip_ratio: Option<f64> = setting(&get, "DEVCOV_MAX_SKIP_RATIO")?;
        if let Some(ratio) = max_skip_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::InvalidSetting {
                    key: "DEVCOV_MAX_SKIP_RATIO",
                    message: format!("{} is outside 0.0..=1.0", ratio),
                });
            }
        }

        Ok(Self {
            limits: Limits {
                max_bytes: setting(&get, "DEVCOV_MAX_BYTES")?,
                max_rows: setting(&get, "DEVCOV_MAX_ROWS")?,
            },
            max_skip_ratio,
            schema_path: get("DEVCOV_SCHEMA").map(PathBuf::from),
            port: setting(&get, "DEVCOV_PORT")?.unwrap_or(DEFAULT_PORT),
        })
    }

    /// Set the schema file
    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    /// Set the skip ratio
    pub fn with_max_skip_ratio(mut self, ratio: f64) -> Self {
        self.max_skip_ratio = Some(ratio);
        self
    }

    /// The configured schema, or the built-in device schema.
    pub fn load_schema(&self) -> ConfigResult<Schema> {
        match &self.schema_path {
            Some(path) => Schema::from_file(path),
            None => Schema::default_device(),
        }
    }

    /// Engine options for one run, on top of per-run parse settings.
    pub fn engine_options(&self, parse: ParseOptions) -> EngineOptions {
        EngineOptions {
            parse: ParseOptions {
                limits: self.limits,
                ..parse
            },
            policy: SkipPolicy {
                max_skip_ratio: self.max_skip_ratio,
            },
        }
    }
}

fn setting<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidSetting {
                key,
                message: format!("'{}': {}", raw, e),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_reads_settings() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("DEVCOV_MAX_BYTES", "1048576"),
            ("DEVCOV_MAX_ROWS", " 5000 "),
            ("DEVCOV_MAX_SKIP_RATIO", "0.25"),
            ("DEVCOV_PORT", "8080"),
            ("DEVCOV_SCHEMA", ""),
        ]))
        .unwrap();
        assert_eq!(config.limits.max_bytes, Some(1_048_576));
        assert_eq!(config.limits.max_rows, Some(5000));
        assert_eq!(config.max_skip_ratio, Some(0.25));
        assert_eq!(config.port, 8080);
        assert!(config.schema_path.is_none());
    }

    #[test]
    fn test_invalid_settings() {
        let err = EngineConfig::from_lookup(lookup(&[("DEVCOV_MAX_ROWS", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { key: "DEVCOV_MAX_ROWS", .. }));

        let err = EngineConfig::from_lookup(lookup(&[("DEVCOV_MAX_SKIP_RATIO", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { key: "DEVCOV_MAX_SKIP_RATIO", .. }));
    }

    #[test]
    fn test_engine_options_carry_limits() {
        let config = EngineConfig::from_lookup(lookup(&[("DEVCOV_MAX_ROWS", "10")]))
            .unwrap()
            .with_max_skip_ratio(0.5);
        let options = config.engine_options(ParseOptions::default());
        assert_eq!(options.parse.limits.max_rows, Some(10));
        assert_eq!(options.policy.max_skip_ratio, Some(0.5));
    }

    #[test]
    fn test_load_schema_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"identifier": "sku", "fields": [
                {{"name": "sku", "type": "string"}},
                {{"name": "tier", "type": "enum", "values": ["gold", "silver"]}}
            ]}}"#
        )
        .unwrap();

        let schema = EngineConfig::default().with_schema_path(file.path()).load_schema().unwrap();
        assert_eq!(schema.identifier, "sku");
        assert_eq!(schema.fields.len(), 2);

        let builtin = EngineConfig::default().load_schema().unwrap();
        assert_eq!(builtin.identifier, "id");
    }
}
