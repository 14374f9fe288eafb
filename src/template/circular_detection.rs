use crate::core::{ConfigError, Result};

/// Tracks the chain of keys currently being expanded.
///
/// A key that is looked up while it is already on the chain is a cycle.
#[derive(Debug, Default)]
pub struct CircularDetector {
    resolving: Vec<String>,
}

impl CircularDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if expanding `key` would re-enter a key already on the chain.
    ///
    /// # Errors
    /// Returns `ConfigError::CircularReference` with the full chain, e.g.
    /// `A -> B -> A`.
    pub fn check(&self, key: &str) -> Result<()> {
        if self.resolving.iter().any(|k| k == key) {
            let mut chain = self.resolving.clone();
            chain.push(key.to_string());
            return Err(ConfigError::CircularReference {
                chain: chain.join(" -> "),
            });
        }
        Ok(())
    }

    /// Marks `key` as being expanded.
    pub fn push(&mut self, key: &str) {
        self.resolving.push(key.to_string());
    }

    /// Marks the innermost key as done.
    pub fn pop(&mut self) {
        self.resolving.pop();
    }

    /// Number of keys currently being expanded.
    pub fn len(&self) -> usize {
        self.resolving.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolving.is_empty()
    }
}
