//! Hierarchical key addressing.
//!
//! Keys in the public API are segments joined by [`SEPARATOR`]. Comparison is
//! case-sensitive and segment-based; no canonicalisation happens beyond the
//! separator itself.

/// Separator between key segments, e.g. `Database:Host`.
pub const SEPARATOR: &str = ":";

/// Joins key segments with the separator, skipping empty segments.
pub fn join<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Splits a key into its segments.
pub fn segments(key: &str) -> impl Iterator<Item = &str> {
    key.split(SEPARATOR)
}

/// Rewrites a source-native key into the public form by replacing
/// `native_separator` with [`SEPARATOR`].
///
/// # Examples
/// * `normalize("Database__Host", "__")` → `"Database:Host"`
/// * `normalize("database.host", ".")` → `"database:host"`
pub fn normalize(native: &str, native_separator: &str) -> String {
    if native_separator.is_empty() || native_separator == SEPARATOR {
        return native.to_string();
    }

    native.replace(native_separator, SEPARATOR)
}

/// Returns the remainder of `key` below `prefix`, or `None` if `key` is not
/// strictly inside the `prefix` section.
///
/// An empty prefix addresses the root, so every key is returned unchanged.
pub fn strip_section<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(key);
    }

    key.strip_prefix(prefix)?.strip_prefix(SEPARATOR)
}

/// Returns the first segment of `key` below `prefix`.
pub fn child_segment<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    strip_section(key, prefix).and_then(|rest| segments(rest).next())
}
