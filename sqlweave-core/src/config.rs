//! Configuration model

use crate::{Dialect, Error, Propagation, Result};
use serde::{Deserialize, Serialize};

/// Settings shared by the builder and every session a factory opens
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log each built statement at debug level
    pub enable_log: bool,
    /// Placeholder style; inferred from the database when unset
    pub dialect: Option<Dialect>,
    /// Propagation used by `Session::begin_default`
    pub default_propagation: Propagation,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.enable_log);
        assert_eq!(config.dialect, None);
        assert_eq!(config.default_propagation, Propagation::Required);
        assert_eq!(Config::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml_str(
            r#"
            enable_log = true
            dialect = "postgres"
            default_propagation = "NESTED"
            "#,
        )
        .unwrap();
        assert!(config.enable_log);
        assert_eq!(config.dialect, Some(Dialect::Postgres));
        assert_eq!(config.default_propagation, Propagation::Nested);
    }

    #[test]
    fn test_unknown_propagation_is_config_error() {
        let err = Config::from_toml_str(r#"default_propagation = "SOMETIMES""#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().starts_with("[Config]"));
    }

    #[test]
    fn test_toml_output_reads_back() {
        let config = Config {
            enable_log: true,
            dialect: Some(Dialect::Generic),
            default_propagation: Propagation::RequiresNew,
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("REQUIRES_NEW"));
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }
}
