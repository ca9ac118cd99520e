//! Placeholder resolution for literal exchange and routing-key values.
//!
//! Only values that are a property reference as a whole (`${...}`) are
//! resolved; anything else is passed through untouched. Inside a reference
//! the usual placeholder rules apply: `${key:default}` defaults, nested
//! placeholders in keys and defaults, and recursive expansion of resolved
//! values.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::debug;

use crate::error::{RabbitRpcError, Result};

const PLACEHOLDER_PREFIX: &str = "${";
const PLACEHOLDER_SUFFIX: &str = "}";
const SIMPLE_PREFIX: &str = "{";
const VALUE_SEPARATOR: char = ':';

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\$\{.*\}$").expect("placeholder pattern is valid"))
}

/// External key/value source placeholders are resolved against
pub trait PropertySource: Send + Sync {
    fn get_property(&self, key: &str) -> Option<String>;
}

impl PropertySource for HashMap<String, String> {
    fn get_property(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl PropertySource for config::Config {
    fn get_property(&self, key: &str) -> Option<String> {
        self.get_string(key).ok()
    }
}

/// Environment variables, with relaxed key binding
///
/// `rpc.queue.payload-only` is looked up as `RPC_QUEUE_PAYLOAD_ONLY`
/// (prefixed with `<PREFIX>_` when a prefix is set).
#[derive(Debug, Clone, Default)]
pub struct EnvPropertySource {
    prefix: Option<String>,
}

impl EnvPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn variable_name(&self, key: &str) -> String {
        let name: String = key
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_ascii_uppercase(), name),
            None => name,
        }
    }
}

impl PropertySource for EnvPropertySource {
    fn get_property(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }
}

/// Ordered list of sources; the first source knowing a key wins
#[derive(Default)]
pub struct CompositePropertySource {
    sources: Vec<Arc<dyn PropertySource>>,
}

impl CompositePropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl PropertySource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }
}

impl PropertySource for CompositePropertySource {
    fn get_property(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.get_property(key))
    }
}

/// Resolves property references against a [`PropertySource`]
#[derive(Clone)]
pub struct PropertyResolver {
    source: Arc<dyn PropertySource>,
}

impl PropertyResolver {
    pub fn new(source: impl PropertySource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    pub fn from_arc(source: Arc<dyn PropertySource>) -> Self {
        Self { source }
    }

    /// Resolver without any properties; references only resolve to defaults
    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// Check whether a value is a property reference as a whole
    pub fn is_reference(value: &str) -> bool {
        !value.is_empty() && reference_pattern().is_match(value)
    }

    /// Resolve `value` if it is a property reference, otherwise return it unchanged
    pub fn replace_if_property(&self, value: &str) -> Result<String> {
        if Self::is_reference(value) {
            let resolved = self.parse_string_value(value, &mut HashSet::new())?;
            debug!("Resolved property reference {} -> {}", value, resolved);
            Ok(resolved)
        } else {
            Ok(value.to_string())
        }
    }

    fn parse_string_value(&self, value: &str, visited: &mut HashSet<String>) -> Result<String> {
        let mut result = value.to_string();
        let mut start = result.find(PLACEHOLDER_PREFIX);

        while let Some(start_index) = start {
            let Some(end_index) = find_placeholder_end(&result, start_index) else {
                break;
            };

            let original = result[start_index + PLACEHOLDER_PREFIX.len()..end_index].to_string();
            if !visited.insert(original.clone()) {
                return Err(RabbitRpcError::CircularPlaceholder { key: original });
            }

            // Keys and defaults may themselves contain placeholders
            let placeholder = self.parse_string_value(&original, visited)?;
            let resolved = match self.source.get_property(&placeholder) {
                Some(value) => Some(value),
                None => placeholder.split_once(VALUE_SEPARATOR).map(|(key, default)| {
                    self.source
                        .get_property(key)
                        .unwrap_or_else(|| default.to_string())
                }),
            };

            let Some(resolved) = resolved else {
                return Err(RabbitRpcError::MissingProperty { key: placeholder });
            };

            let resolved = self.parse_string_value(&resolved, visited)?;
            result.replace_range(start_index..end_index + PLACEHOLDER_SUFFIX.len(), &resolved);
            start = result[start_index + resolved.len()..]
                .find(PLACEHOLDER_PREFIX)
                .map(|offset| start_index + resolved.len() + offset);

            visited.remove(&original);
        }

        Ok(result)
    }
}

impl std::fmt::Debug for PropertyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyResolver").finish_non_exhaustive()
    }
}

/// Index of the suffix closing the placeholder opened at `start`
fn find_placeholder_end(value: &str, start: usize) -> Option<usize> {
    let mut index = start + PLACEHOLDER_PREFIX.len();
    let mut nested = 0usize;

    while index < value.len() {
        let rest = &value[index..];
        if rest.starts_with(PLACEHOLDER_SUFFIX) {
            if nested == 0 {
                return Some(index);
            }
            nested -= 1;
            index += PLACEHOLDER_SUFFIX.len();
        } else if rest.starts_with(SIMPLE_PREFIX) {
            nested += 1;
            index += SIMPLE_PREFIX.len();
        } else {
            index += rest.chars().next().map_or(1, char::len_utf8);
        }
    }

    None
}
