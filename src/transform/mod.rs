//! Value transform pipeline.
//!
//! Two independent stages sit between the merge resolver and callers:
//! an optional encryption stage applied on write and reversed on read, and a
//! masking stage that only ever produces display strings. Each stage owns
//! its own sensitive-key [`PatternSet`].

pub mod cipher;
pub mod encryption;
pub mod masking;
pub mod patterns;

use std::sync::Arc;

pub use cipher::{AesGcmCipher, ChaChaCipher, CipherError, CipherProvider};
pub use encryption::ValueEncryptor;
pub use masking::ValueMasker;
pub use patterns::{DEFAULT_SENSITIVE_PATTERNS, KeyClassifier, PatternSet};

use crate::{core::Result, settings::EngineSettings};

/// Both transform stages, configured from engine settings.
pub struct TransformPipeline {
    encryptor: Option<ValueEncryptor>,
    masker: ValueMasker,
}

impl TransformPipeline {
    /// Builds the pipeline. Encryption is active only when a provider is given.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidPattern` if a configured pattern is invalid.
    pub fn new(settings: &EngineSettings, provider: Option<Arc<dyn CipherProvider>>) -> Result<Self> {
        let encryptor = provider
            .map(|provider| {
                PatternSet::or_defaults(settings.encryption.patterns.as_deref()).map(|patterns| {
                    ValueEncryptor::new(provider, settings.encryption.prefix.clone(), patterns)
                })
            })
            .transpose()?;

        let masker = ValueMasker::new(
            &settings.masking,
            PatternSet::or_defaults(settings.masking.patterns.as_deref())?,
        );

        Ok(Self { encryptor, masker })
    }

    /// Applies the write-side transforms.
    ///
    /// # Errors
    /// Returns `ConfigError::Encryption` if encryption fails.
    pub fn on_write(&self, key: &str, value: Option<&str>) -> Result<Option<String>> {
        match &self.encryptor {
            Some(encryptor) => encryptor.on_write(key, value),
            None => Ok(value.map(str::to_string)),
        }
    }

    /// Applies the read-side transforms.
    ///
    /// # Errors
    /// Returns `ConfigError::Decryption` if a tagged value cannot be decrypted.
    pub fn on_read(&self, key: &str, value: Option<&str>) -> Result<Option<String>> {
        match &self.encryptor {
            Some(encryptor) => encryptor.on_read(key, value),
            None => Ok(value.map(str::to_string)),
        }
    }

    /// Display form of `value` under `key`.
    pub fn mask(&self, key: &str, value: Option<&str>) -> String {
        self.masker.mask(key, value)
    }

    /// Encryption stage, when configured.
    pub fn encryptor(&self) -> Option<&ValueEncryptor> {
        self.encryptor.as_ref()
    }

    /// Masking stage.
    pub fn masker(&self) -> &ValueMasker {
        &self.masker
    }

    /// Drops cached pattern decisions in both stages.
    pub fn clear_cache(&self) {
        if let Some(encryptor) = &self.encryptor {
            encryptor.clear_cache();
        }
        self.masker.clear_cache();
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self {
            encryptor: None,
            masker: ValueMasker::default(),
        }
    }
}
