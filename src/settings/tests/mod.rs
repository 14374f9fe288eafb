//! Unit tests for engine settings
//!
//! Defaults, TOML parsing and schema generation. No filesystem dependencies.

use std::time::Duration;

use crate::settings::{EngineSettings, ReloadOptions, ReloadStrategy};

#[test]
fn defaults_match_documented_values() {
    let settings = EngineSettings::default();

    assert_eq!(settings.reload.strategy, ReloadStrategy::Eager);
    assert_eq!(settings.reload.debounce(), Duration::from_millis(100));
    assert!(settings.reload.rollback_on_error);
    assert_eq!(settings.masking.mask, "***");
    assert_eq!(settings.masking.visible_chars, 3);
    assert_eq!(settings.masking.null_placeholder, "[null]");
    assert_eq!(settings.encryption.prefix, "ENC:");
    assert_eq!(settings.template.prefix, "${");
    assert_eq!(settings.template.suffix, "}");
}

#[test]
fn empty_document_yields_defaults() {
    let settings = EngineSettings::from_toml_str("").unwrap();
    assert_eq!(settings, EngineSettings::default());
}

#[test]
fn partial_document_keeps_other_defaults() {
    let settings = EngineSettings::from_toml_str(
        r#"
        [reload]
        strategy = "lazy"
        debounce_ms = 250
        key_prefix_filters = ["Database"]

        [masking]
        patterns = ["*pin*"]
    "#,
    )
    .unwrap();

    assert_eq!(settings.reload.strategy, ReloadStrategy::Lazy);
    assert_eq!(settings.reload.debounce_ms, 250);
    assert!(settings.reload.rollback_on_error);
    assert_eq!(settings.masking.patterns, Some(vec!["*pin*".to_string()]));
    assert_eq!(settings.masking.visible_chars, 3);
}

#[test]
fn unknown_strategy_is_rejected() {
    let result = EngineSettings::from_toml_str("[reload]\nstrategy = \"sometimes\"\n");
    assert!(result.is_err());
}

#[test]
fn prefix_filters_restrict_publication() {
    let options = ReloadOptions {
        key_prefix_filters: vec!["Database".to_string(), "Cache:".to_string()],
        ..ReloadOptions::default()
    };

    assert!(options.publishes("Database:Host"));
    assert!(options.publishes("Cache:Size"));
    assert!(!options.publishes("Logging:Level"));
    assert!(ReloadOptions::default().publishes("anything"));
}

#[test]
fn schema_names_sections() {
    let schema = serde_json::to_string(&EngineSettings::schema()).unwrap();

    assert!(schema.contains("reload"));
    assert!(schema.contains("masking"));
    assert!(schema.contains("template"));
}
