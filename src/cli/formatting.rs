//! Formatting utilities for CLI output.
//!
//! Consistent rendering of configuration values and change batches, plus
//! styled help text.

use crate::config_store::{ChangeBatch, ChangeKind, ChangeRecord};

/// ANSI color codes for terminal output
pub struct Colors;

impl Colors {
    /// Reset all formatting
    pub const RESET: &'static str = "\x1b[0m";
    /// Bold text
    pub const BOLD: &'static str = "\x1b[1m";
    /// Dim text
    pub const DIM: &'static str = "\x1b[2m";

    /// Red color
    pub const RED: &'static str = "\x1b[31m";
    /// Green color
    pub const GREEN: &'static str = "\x1b[32m";
    /// Yellow color
    pub const YELLOW: &'static str = "\x1b[33m";
    /// Blue color
    pub const BLUE: &'static str = "\x1b[34m";
    /// Cyan color
    pub const CYAN: &'static str = "\x1b[36m";
}

/// Formats section headers with styling
pub fn format_header(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::CYAN, text, Colors::RESET)
}

/// Formats command names with styling
pub fn format_command(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::GREEN, text, Colors::RESET)
}

/// Formats category names with styling
pub fn format_category(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::BLUE, text, Colors::RESET)
}

/// Formats descriptions with muted styling
pub fn format_description(text: &str) -> String {
    format!("{}{}{}", Colors::DIM, text, Colors::RESET)
}

/// Formats usage examples with styling
pub fn format_usage(text: &str) -> String {
    format!("{}{}{}", Colors::DIM, text, Colors::RESET)
}

/// Formats error messages with red styling
pub fn format_error(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::RED, text, Colors::RESET)
}

/// Formats a nullable configuration value for display.
///
/// Present values are quoted; a key present without a value prints `null`.
///
/// # Examples
///
/// ```
/// use confstack::cli::formatting::format_value;
///
/// assert_eq!(format_value(Some("hello")), "\"hello\"");
/// assert_eq!(format_value(None), "null");
/// ```
pub fn format_value(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("\"{v}\""),
        None => "null".to_string(),
    }
}

/// One line describing a single key change, without colors.
pub fn format_change(change: &ChangeRecord) -> String {
    match change.kind {
        ChangeKind::Added => format!(
            "+ {} = {}",
            change.key,
            format_value(change.new_value.as_deref())
        ),
        ChangeKind::Removed => format!(
            "- {} (was {})",
            change.key,
            format_value(change.old_value.as_deref())
        ),
        ChangeKind::Modified => format!(
            "~ {}: {} -> {}",
            change.key,
            format_value(change.old_value.as_deref()),
            format_value(change.new_value.as_deref())
        ),
    }
}

/// Header line plus one [`format_change`] line per key, in key order.
pub fn format_batch(batch: &ChangeBatch) -> String {
    let mut out = format!(
        "{}{}[{}] batch {} ({} changes){}",
        Colors::BOLD,
        Colors::YELLOW,
        batch.timestamp.format("%H:%M:%S%.3f"),
        batch.batch_id,
        batch.len(),
        Colors::RESET
    );

    for change in batch.changes.values() {
        out.push('\n');
        out.push_str("  ");
        out.push_str(&format_change(change));
    }

    out
}
