//! Interpreter configuration
//!
//! Loaded once (from TOML or built in code) and shared read-only by every
//! evaluator of a build pass.

use crate::runtime::namespace::NamespaceRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Low enough to trip before a debug build exhausts a 2 MiB thread stack.
pub const DEFAULT_MAX_DEPTH: usize = 128;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("namespace alias '{alias}' points at unknown namespace '{target}'")]
    UnknownAliasTarget { alias: String, target: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Maximum form nesting depth before evaluation is aborted.
    pub max_depth: usize,
    /// Extra names for registered namespaces, alias -> registered name.
    pub namespace_aliases: BTreeMap<String, String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            namespace_aliases: BTreeMap::new(),
        }
    }
}

impl InterpreterConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply the configured aliases to `registry`.
    pub fn apply_aliases(&self, registry: NamespaceRegistry) -> Result<NamespaceRegistry, ConfigError> {
        self.namespace_aliases
            .iter()
            .try_fold(registry, |registry, (alias, target)| {
                registry
                    .alias(alias, target)
                    .map_err(|target| ConfigError::UnknownAliasTarget {
                        alias: alias.clone(),
                        target,
                    })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = InterpreterConfig::from_toml_str("").unwrap();
        assert_eq!(config, InterpreterConfig::default());
    }

    #[test]
    fn parses_depth_and_aliases() {
        let config = InterpreterConfig::from_toml_str(
            r#"
            max_depth = 64

            [namespace_aliases]
            tf = "ops"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_depth, 64);
        assert_eq!(config.namespace_aliases.get("tf").map(String::as_str), Some("ops"));

        let registry = config
            .apply_aliases(NamespaceRegistry::with_defaults())
            .unwrap();
        assert!(registry.get("tf").is_some());
    }

    #[test]
    fn alias_to_unknown_namespace_is_rejected() {
        let config = InterpreterConfig::from_toml_str("[namespace_aliases]\nx = \"nope\"\n").unwrap();
        let err = config
            .apply_aliases(NamespaceRegistry::with_defaults())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAliasTarget { .. }));
    }
}
