use serde::Deserialize;

use rowbind_api::naming::{ColumnNaming, NameJoiner};

use crate::error::ConfigError;

/// Mapper configuration, parsed from TOML.
///
/// ```toml
/// naming = "camel_case"
/// joiner = "snake"
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapperConfig {
    /// Parameter name → column name conversion.
    #[serde(default)]
    pub naming: ColumnNaming,

    /// Joiner for `#[row(flatten)]` parameters without an explicit one.
    #[serde(default)]
    pub joiner: NameJoiner,
}

impl MapperConfig {
    pub fn new(naming: ColumnNaming) -> Self {
        Self {
            naming,
            joiner: NameJoiner::default(),
        }
    }

    pub fn with_joiner(mut self, joiner: NameJoiner) -> Self {
        self.joiner = joiner;
        self
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = MapperConfig::parse("").expect("parse");
        assert_eq!(config, MapperConfig::default());
        assert_eq!(config.naming, ColumnNaming::AsIs);
        assert_eq!(config.joiner, NameJoiner::Snake);
    }

    #[test]
    fn parses_naming_and_joiner() {
        let config = MapperConfig::parse(
            r#"
            naming = "camel_case"
            joiner = "camel"
            "#,
        )
        .expect("parse");
        assert_eq!(config.naming, ColumnNaming::CamelCase);
        assert_eq!(config.joiner, NameJoiner::Camel);
    }

    #[test]
    fn rejects_unknown_keys_and_values() {
        assert!(matches!(
            MapperConfig::parse("naming = \"shouting\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            MapperConfig::parse("strict = true"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = MapperConfig::load("/nonexistent/rowbind.toml").expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
