use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Template variable resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TemplateOptions {
    /// Token opening sequence.
    pub prefix: String,

    /// Token closing sequence.
    pub suffix: String,

    /// Maximum nesting of expansions before resolution fails.
    pub max_recursion_depth: usize,

    /// Leave tokens without a value in the output verbatim. When false they
    /// are replaced with an empty string.
    pub keep_unresolved: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            prefix: "${".to_string(),
            suffix: "}".to_string(),
            max_recursion_depth: 10,
            keep_unresolved: true,
        }
    }
}
