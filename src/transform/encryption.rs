use std::sync::Arc;

use tracing::{debug, instrument};

use super::{
    cipher::CipherProvider,
    patterns::{KeyClassifier, PatternSet},
};
use crate::core::{ConfigError, Result};

/// Encryption stage of the transform pipeline.
///
/// Writes to keys matching the sensitive pattern set are encrypted and tagged
/// with the marker prefix. Reads decrypt every tagged value whatever its key.
pub struct ValueEncryptor {
    provider: Arc<dyn CipherProvider>,
    prefix: String,
    classifier: KeyClassifier,
}

impl ValueEncryptor {
    /// Creates a stage over `provider`, tagging ciphertext with `prefix`.
    pub fn new(provider: Arc<dyn CipherProvider>, prefix: impl Into<String>, patterns: PatternSet) -> Self {
        Self {
            provider,
            prefix: prefix.into(),
            classifier: KeyClassifier::new(patterns),
        }
    }

    /// Whether `value` carries the marker prefix.
    pub fn is_encrypted(&self, value: &str) -> bool {
        value.starts_with(&self.prefix)
    }

    /// Whether writes to `key` are encrypted.
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.classifier.matches(key)
    }

    /// Transforms a value on its way into a pending overlay.
    ///
    /// # Errors
    /// Returns `ConfigError::Encryption` if the provider fails.
    #[instrument(skip(self, value), fields(cipher = self.provider.name()))]
    pub fn on_write(&self, key: &str, value: Option<&str>) -> Result<Option<String>> {
        let Some(value) = value else {
            return Ok(None);
        };

        if self.is_encrypted(value) || !self.classifier.matches(key) {
            return Ok(Some(value.to_string()));
        }

        let sealed = self
            .provider
            .encrypt(value)
            .map_err(|e| ConfigError::Encryption {
                key: key.to_string(),
                details: e.to_string(),
            })?;

        debug!("Encrypted sensitive value");
        Ok(Some(format!("{}{sealed}", self.prefix)))
    }

    /// Transforms a resolved value on its way to the caller.
    ///
    /// # Errors
    /// Returns `ConfigError::Decryption` on tampered or wrong-key ciphertext.
    pub fn on_read(&self, key: &str, value: Option<&str>) -> Result<Option<String>> {
        let Some(value) = value else {
            return Ok(None);
        };

        let Some(sealed) = value.strip_prefix(self.prefix.as_str()) else {
            return Ok(Some(value.to_string()));
        };

        self.provider
            .decrypt(sealed)
            .map(Some)
            .map_err(|e| ConfigError::Decryption {
                key: key.to_string(),
                details: e.to_string(),
            })
    }

    /// Replaces the sensitive pattern set.
    pub fn set_patterns(&self, patterns: PatternSet) {
        self.classifier.replace_patterns(patterns);
    }

    /// Drops cached pattern decisions.
    pub fn clear_cache(&self) {
        self.classifier.clear_cache();
    }

    /// Marker prefix used to tag ciphertext.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
