use std::env;

use async_trait::async_trait;
use tracing::debug;

use super::{ConfigSource, ValueMap, key};
use crate::core::Result;

/// Native separator used in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Process environment source.
///
/// Variable names are normalised by replacing `__` with `:`, so
/// `APP_Database__Host` with prefix `APP_` is exposed as `Database:Host`.
/// Read-only and never reloaded.
pub struct EnvironmentSource {
    name: String,
    prefix: Option<String>,
}

impl EnvironmentSource {
    /// Exposes every environment variable.
    pub fn new() -> Self {
        Self {
            name: "env".to_string(),
            prefix: None,
        }
    }

    /// Exposes only variables starting with `prefix`, with the prefix stripped.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            name: format!("env:{prefix}"),
            prefix: Some(prefix),
        }
    }
}

impl Default for EnvironmentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigSource for EnvironmentSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<ValueMap> {
        let values: ValueMap = env::vars_os()
            .filter_map(|(name, value)| {
                let name = name.into_string().ok()?;
                let value = value.into_string().ok()?;
                let stripped = match &self.prefix {
                    Some(prefix) => name.strip_prefix(prefix.as_str())?.to_string(),
                    None => name,
                };
                (!stripped.is_empty())
                    .then(|| (key::normalize(&stripped, ENV_SEPARATOR), Some(value)))
            })
            .collect();

        debug!(source = %self.name, keys = values.len(), "Loaded environment variables");
        Ok(values)
    }
}
