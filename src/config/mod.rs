//! Runtime configuration, usually loaded from a `widgets.toml`.
//!
//! | Section      | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | `[markup]`   | Attribute names and the anchor comment text      |
//! | `[registry]` | Behavior for requests of undefined names         |
//! | `[attach]`   | Handling of overlapping start transitions        |
//!
//! Every section is optional. Unknown keys are rejected.

mod error;
mod section;

pub use error::ConfigError;
pub use section::{AttachConfig, AttachPolicy, MarkupConfig, RegistryConfig};

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub markup: MarkupConfig,
    pub registry: RegistryConfig,
    pub attach: AttachConfig,
}

impl RuntimeConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::parse(&content).with_context(|| format!("Invalid config `{}`", path.display()))
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let (config, ignored) = Self::parse_with_ignored(content)?;
        if !ignored.is_empty() {
            return Err(ConfigError::Validation(format!(
                "unknown fields: {}",
                ignored.join(", ")
            )));
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let markup = &self.markup;
        for (field, value) in [
            ("markup.prefix", &markup.prefix),
            ("markup.name_attribute", &markup.name_attribute),
            ("markup.partial_attribute", &markup.partial_attribute),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Validation(format!("`{field}` must not be empty")));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(ConfigError::Validation(format!(
                    "`{field}` must not contain whitespace, got {value:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub fn test_parse_config(content: &str) -> RuntimeConfig {
    let (parsed, ignored) = RuntimeConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}
