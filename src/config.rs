use serde::Deserialize;

use crate::error::Error;

/// Statement configuration, passed explicitly to
/// [`Statement::new`](crate::Statement::new).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use sqlx_named_stmt::config::{QuoteMode, StatementConfig};
///
/// let config = StatementConfig::from_json(r#"{ "long_data_chunk": 65536, "quoting": "loose" }"#)?;
/// assert_eq!(config.long_data_chunk, 65536);
/// assert_eq!(config.quoting, QuoteMode::Loose);
/// assert_eq!(config.params_capacity, 40);
/// # Ok::<(), sqlx_named_stmt::Error>(())
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatementConfig {
    /// Growth chunk of the parameter table.
    #[serde(default = "default_params_capacity")]
    pub params_capacity: usize,

    /// Size of the buffer handed to streaming callbacks, in bytes.
    #[serde(default = "default_long_data_chunk")]
    pub long_data_chunk: usize,

    /// How quoted regions are closed while scanning for placeholders.
    #[serde(default)]
    pub quoting: QuoteMode,

    /// What `bind` does with a name the query does not contain.
    #[serde(default)]
    pub unknown_parameter: UnknownParameter,

    /// Fail `execute` when a placeholder was never bound.
    #[serde(default = "default_reject_unbound")]
    pub reject_unbound: bool,

    /// Arena sizing.
    #[serde(default)]
    pub arena: ArenaConfig,
}

/// Quote matching rule of the placeholder scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteMode {
    /// A region opened by `'`, `"` or `` ` `` is closed only by the same character.
    #[default]
    Strict,
    /// Any quote character closes the current region.
    Loose,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownParameter {
    /// Binding an unknown name updates nothing.
    #[default]
    Ignore,
    /// Binding an unknown name returns [`Error::UnknownParameter`].
    Error,
}

/// Sizing of the statement, query and result arenas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArenaConfig {
    /// Allocations each arena reserves room for up front.
    #[serde(default)]
    pub initial_size: usize,
    /// Byte limit of the statement tier.
    #[serde(default)]
    pub statement: Option<usize>,
    /// Byte limit of the query tier.
    #[serde(default)]
    pub query: Option<usize>,
    /// Byte limit of the result tier.
    #[serde(default)]
    pub result: Option<usize>,
}

fn default_params_capacity() -> usize {
    40
}

fn default_long_data_chunk() -> usize {
    4096
}

fn default_reject_unbound() -> bool {
    true
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            params_capacity: default_params_capacity(),
            long_data_chunk: default_long_data_chunk(),
            quoting: QuoteMode::default(),
            unknown_parameter: UnknownParameter::default(),
            reject_unbound: default_reject_unbound(),
            arena: ArenaConfig::default(),
        }
    }
}

impl StatementConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.long_data_chunk == 0 {
            return Err(Error::Config("long_data_chunk must be greater than zero".into()));
        }
        if self.params_capacity == 0 {
            return Err(Error::Config("params_capacity must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StatementConfig::default();
        assert_eq!(config.params_capacity, 40);
        assert_eq!(config.long_data_chunk, 4096);
        assert_eq!(config.quoting, QuoteMode::Strict);
        assert_eq!(config.unknown_parameter, UnknownParameter::Ignore);
        assert!(config.reject_unbound);
        assert_eq!(config.arena, ArenaConfig::default());
    }

    #[test]
    fn test_empty_json_is_default() {
        let config = StatementConfig::from_json("{}").unwrap();
        assert_eq!(config.long_data_chunk, 4096);
    }

    #[test]
    fn test_arena_limits() {
        let config =
            StatementConfig::from_json(r#"{ "arena": { "initial_size": 8, "result": 1048576 } }"#)
                .unwrap();
        assert_eq!(config.arena.initial_size, 8);
        assert_eq!(config.arena.result, Some(1048576));
        assert_eq!(config.arena.query, None);
    }

    #[test]
    fn test_zero_chunk_is_rejected() {
        let err = StatementConfig::from_json(r#"{ "long_data_chunk": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(StatementConfig::from_json(r#"{ "chunk": 1 }"#).is_err());
    }

    #[test]
    fn test_unknown_parameter_policy() {
        let config = StatementConfig::from_json(r#"{ "unknown_parameter": "error" }"#).unwrap();
        assert_eq!(config.unknown_parameter, UnknownParameter::Error);
    }
}
