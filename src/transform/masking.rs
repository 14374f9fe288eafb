use std::collections::BTreeMap;

use super::patterns::{KeyClassifier, PatternSet};
use crate::settings::MaskingOptions;

/// Masking stage of the transform pipeline.
///
/// Read-only: produces display strings and never touches stored data.
/// Lengths are counted in characters, not bytes.
pub struct ValueMasker {
    mask: String,
    visible_chars: usize,
    null_placeholder: String,
    classifier: KeyClassifier,
}

impl ValueMasker {
    /// Creates a masker from options, using `patterns` for classification.
    pub fn new(options: &MaskingOptions, patterns: PatternSet) -> Self {
        Self {
            mask: options.mask.clone(),
            visible_chars: options.visible_chars,
            null_placeholder: options.null_placeholder.clone(),
            classifier: KeyClassifier::new(patterns),
        }
    }

    /// Whether `key` is masked.
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.classifier.matches(key)
    }

    /// Display form of `value` stored under `key`.
    pub fn mask(&self, key: &str, value: Option<&str>) -> String {
        let Some(value) = value else {
            return self.null_placeholder.clone();
        };

        if !self.classifier.matches(key) {
            return value.to_string();
        }

        let len = value.chars().count();
        if len <= self.visible_chars * 2 {
            return self.mask.clone();
        }

        let head: String = value.chars().take(self.visible_chars).collect();
        let tail: String = value.chars().skip(len - self.visible_chars).collect();
        format!("{head}{}{tail}", self.mask)
    }

    /// Masks every entry of `values`.
    pub fn mask_all<'a, I>(&self, values: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        values
            .into_iter()
            .map(|(key, value)| (key.to_string(), self.mask(key, value)))
            .collect()
    }

    /// Replaces the sensitive pattern set.
    pub fn set_patterns(&self, patterns: PatternSet) {
        self.classifier.replace_patterns(patterns);
    }

    /// Drops cached pattern decisions.
    pub fn clear_cache(&self) {
        self.classifier.clear_cache();
    }
}

impl Default for ValueMasker {
    fn default() -> Self {
        Self::new(&MaskingOptions::default(), PatternSet::sensitive_defaults())
    }
}
