//! Template variable resolution.
//!
//! Expands `${...}` tokens inside resolved string values. A token body of the
//! form `NS:name` with a registered namespace (`ENV`, `SYS` by default) is
//! routed to that namespace's resolver; any other body is looked up as a key
//! against the merged configuration itself. Expanded text is scanned again,
//! so references may chain.

mod circular_detection;
pub mod system;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

pub use circular_detection::CircularDetector;
pub use system::{EnvResolver, NamespaceResolver, SystemResolver};

use crate::{
    core::{ConfigError, Result},
    settings::TemplateOptions,
};

/// Self-referential key lookup used for non-namespaced tokens.
pub trait ValueLookup {
    /// Resolved value for `key`, or `None` if absent.
    ///
    /// # Errors
    /// Propagates failures of the underlying read, such as decryption errors.
    fn lookup(&self, key: &str) -> Result<Option<String>>;
}

impl ValueLookup for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key).cloned())
    }
}

impl ValueLookup for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key).cloned())
    }
}

/// Recursive `${...}` expander with cycle and depth guards.
pub struct TemplateResolver {
    options: TemplateOptions,
    namespaces: HashMap<String, Box<dyn NamespaceResolver>>,
}

impl TemplateResolver {
    /// Creates a resolver with the `ENV` and `SYS` namespaces registered.
    pub fn new(options: TemplateOptions) -> Self {
        Self::bare(options)
            .with_namespace("ENV", EnvResolver)
            .with_namespace("SYS", SystemResolver)
    }

    /// Creates a resolver with no namespaces; every token is a key lookup.
    pub fn bare(options: TemplateOptions) -> Self {
        Self {
            options,
            namespaces: HashMap::new(),
        }
    }

    /// Registers `resolver` for tokens of the form `name:...`. Namespace
    /// names match case-insensitively.
    pub fn with_namespace(mut self, name: &str, resolver: impl NamespaceResolver + 'static) -> Self {
        self.namespaces
            .insert(name.to_ascii_uppercase(), Box::new(resolver));
        self
    }

    pub fn options(&self) -> &TemplateOptions {
        &self.options
    }

    /// Expands every token in `text`.
    ///
    /// # Errors
    /// * `ConfigError::CircularReference` - A key refers back to itself, directly or indirectly
    /// * `ConfigError::MaxRecursionExceeded` - Nested expansion is deeper than the configured limit
    /// * any error returned by `lookup`
    pub fn resolve(&self, text: &str, lookup: &dyn ValueLookup) -> Result<String> {
        let mut detector = CircularDetector::new();
        self.expand(text, lookup, &mut detector, 0)
    }

    fn expand(
        &self,
        text: &str,
        lookup: &dyn ValueLookup,
        detector: &mut CircularDetector,
        depth: usize,
    ) -> Result<String> {
        let prefix = self.options.prefix.as_str();
        let suffix = self.options.suffix.as_str();

        if prefix.is_empty() || !text.contains(prefix) {
            return Ok(text.to_string());
        }

        if depth > self.options.max_recursion_depth {
            return Err(ConfigError::MaxRecursionExceeded {
                max_depth: self.options.max_recursion_depth,
            });
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(prefix) {
            out.push_str(&rest[..start]);
            let after = &rest[start + prefix.len()..];

            let Some(end) = after.find(suffix) else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };

            let body = &after[..end];
            let token = &rest[start..start + prefix.len() + end + suffix.len()];

            match self.resolve_token(body, lookup, detector, depth)? {
                Some(value) => out.push_str(&value),
                None if self.options.keep_unresolved => out.push_str(token),
                None => {}
            }

            rest = &after[end + suffix.len()..];
        }

        out.push_str(rest);
        Ok(out)
    }

    fn resolve_token(
        &self,
        body: &str,
        lookup: &dyn ValueLookup,
        detector: &mut CircularDetector,
        depth: usize,
    ) -> Result<Option<String>> {
        if let Some((namespace, name)) = body.split_once(':')
            && let Some(resolver) = self.namespaces.get(&namespace.to_ascii_uppercase())
        {
            trace!(namespace, name, "Resolving namespaced token");
            return resolver
                .resolve(name)
                .map(|value| self.expand(&value, lookup, detector, depth + 1))
                .transpose();
        }

        detector.check(body)?;

        let Some(value) = lookup.lookup(body)? else {
            trace!(key = body, "Unresolved template token");
            return Ok(None);
        };

        detector.push(body);
        let expanded = self.expand(&value, lookup, detector, depth + 1);
        detector.pop();

        expanded.map(Some)
    }
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new(TemplateOptions::default())
    }
}
