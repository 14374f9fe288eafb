use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use regex::RegexSet;
use tracing::trace;

use crate::core::{ConfigError, Result};

/// Patterns selecting sensitive keys when none are configured explicitly.
pub const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &[
    "*password*",
    "*secret*",
    "*token*",
    "*key*",
    "*connectionstring*",
    "*credential*",
];

/// A compiled set of case-insensitive glob patterns.
///
/// `*` matches any run of characters, every other character matches itself.
/// Patterns are evaluated against the full hierarchical key.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<String>,
    compiled: RegexSet,
}

impl PatternSet {
    /// Compiles `patterns`.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidPattern` if a pattern cannot be compiled.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let compiled = RegexSet::new(patterns.iter().map(|p| glob_to_regex(p))).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: patterns.join(", "),
                details: e.to_string(),
            }
        })?;

        Ok(Self { patterns, compiled })
    }

    /// The built-in sensitive-key set.
    pub fn sensitive_defaults() -> Self {
        Self::new(DEFAULT_SENSITIVE_PATTERNS.iter().copied()).unwrap_or_default()
    }

    /// Uses `patterns` when supplied, otherwise the built-in set.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidPattern` if a supplied pattern cannot be compiled.
    pub fn or_defaults(patterns: Option<&[String]>) -> Result<Self> {
        match patterns {
            Some(patterns) => Self::new(patterns.iter().cloned()),
            None => Ok(Self::sensitive_defaults()),
        }
    }

    /// Whether any pattern matches `key`.
    pub fn is_match(&self, key: &str) -> bool {
        self.compiled.is_match(key)
    }

    /// Source patterns in the order supplied.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            compiled: RegexSet::empty(),
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    format!("(?is)^{body}$")
}

/// Memoising key classifier.
///
/// Decisions are cached per `(key, pattern set version)`, so replacing the
/// pattern set makes every earlier decision unreachable without a scan.
#[derive(Debug)]
pub struct KeyClassifier {
    patterns: RwLock<Arc<PatternSet>>,
    version: AtomicU64,
    decisions: RwLock<HashMap<(String, u64), bool>>,
}

impl KeyClassifier {
    /// Creates a classifier over `patterns`.
    pub fn new(patterns: PatternSet) -> Self {
        Self {
            patterns: RwLock::new(Arc::new(patterns)),
            version: AtomicU64::new(0),
            decisions: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `key` matches the current pattern set.
    pub fn matches(&self, key: &str) -> bool {
        let version = self.version.load(Ordering::Acquire);
        let cache_key = (key.to_string(), version);

        if let Some(decision) = self.decisions.read().get(&cache_key) {
            return *decision;
        }

        let decision = self.patterns.read().is_match(key);
        trace!(key, version, decision, "Classified key");
        self.decisions.write().insert(cache_key, decision);
        decision
    }

    /// Replaces the pattern set and bumps the pattern version.
    pub fn replace_patterns(&self, patterns: PatternSet) {
        *self.patterns.write() = Arc::new(patterns);
        self.version.fetch_add(1, Ordering::AcqRel);
        self.decisions.write().clear();
    }

    /// Current pattern set version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Patterns currently in effect.
    pub fn patterns(&self) -> Arc<PatternSet> {
        self.patterns.read().clone()
    }

    /// Drops every cached decision.
    pub fn clear_cache(&self) {
        self.decisions.write().clear();
    }

    /// Number of cached decisions.
    pub fn cached_decisions(&self) -> usize {
        self.decisions.read().len()
    }
}
