//! Engine settings.
//!
//! Everything tunable about the engine itself (reload behaviour, masking,
//! encryption markers, template syntax) lives in [`EngineSettings`], which can
//! be deserialized from TOML. Every field has a default, so an empty document
//! yields the default engine.

mod reload;
mod template;
mod transform;

#[cfg(test)]
mod tests;

use std::path::Path;

use schemars::{JsonSchema, Schema, schema_for};
use serde::{Deserialize, Serialize};

use crate::core::{ConfigError, Result};

pub use reload::{ReloadOptions, ReloadStrategy};
pub use template::TemplateOptions;
pub use transform::{DEFAULT_CIPHER_PREFIX, EncryptionOptions, MaskingOptions};

/// Complete engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct EngineSettings {
    /// Dynamic reload and change notification.
    #[serde(default)]
    pub reload: ReloadOptions,

    /// Sensitive-value masking.
    #[serde(default)]
    pub masking: MaskingOptions,

    /// Transparent value encryption.
    #[serde(default)]
    pub encryption: EncryptionOptions,

    /// Template variable resolution.
    #[serde(default)]
    pub template: TemplateOptions,
}

impl EngineSettings {
    /// Parses settings from a TOML document.
    ///
    /// # Errors
    /// Returns `ConfigError::Settings` if the document is not valid TOML or
    /// does not match the settings schema.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Settings {
            location: "string".to_string(),
            details: e.to_string(),
        })
    }

    /// Reads settings from a TOML file.
    ///
    /// # Errors
    /// * `ConfigError::Io` - If the file cannot be read
    /// * `ConfigError::Settings` - If the file content is invalid
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(&e, path))?;

        toml::from_str(&content).map_err(|e| ConfigError::Settings {
            location: path.display().to_string(),
            details: e.to_string(),
        })
    }

    /// JSON schema describing the settings document.
    pub fn schema() -> Schema {
        schema_for!(EngineSettings)
    }
}
