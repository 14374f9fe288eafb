use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Marker prefix placed in front of every encrypted value.
pub const DEFAULT_CIPHER_PREFIX: &str = "ENC:";

/// Sensitive-value masking settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct MaskingOptions {
    /// Replacement inserted between the visible ends of a masked value.
    pub mask: String,

    /// Characters left visible at each end of a masked value.
    pub visible_chars: usize,

    /// Text shown in place of a null value.
    pub null_placeholder: String,

    /// Case-insensitive glob patterns selecting sensitive keys. Replaces the
    /// built-in set when present.
    pub patterns: Option<Vec<String>>,
}

impl Default for MaskingOptions {
    fn default() -> Self {
        Self {
            mask: "***".to_string(),
            visible_chars: 3,
            null_placeholder: "[null]".to_string(),
            patterns: None,
        }
    }
}

/// Transparent value encryption settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct EncryptionOptions {
    /// Marker prefix identifying ciphertext.
    pub prefix: String,

    /// Case-insensitive glob patterns selecting keys encrypted on write.
    /// Replaces the built-in set when present.
    pub patterns: Option<Vec<String>>,
}

impl Default for EncryptionOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_CIPHER_PREFIX.to_string(),
            patterns: None,
        }
    }
}
