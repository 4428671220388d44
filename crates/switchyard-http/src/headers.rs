//! Case-insensitive response header map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use switchyard_core::{SwitchyardError, SwitchyardResult};

/// Response headers keyed case-insensitively.
///
/// Each entry remembers the name as it was first set so output keeps the
/// caller's spelling. Iteration order is stable (sorted by lowercase name).
///
/// ```
/// use switchyard_http::headers::ResponseHeaders;
///
/// let mut headers = ResponseHeaders::new();
/// headers.set("Cache-Control", "max-age=60").unwrap();
/// assert_eq!(headers.get("cache-control"), Some("max-age=60"));
/// assert!(headers.set("X-Bad", "a\nb").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeaders {
    entries: BTreeMap<String, (String, String)>,
}

impl ResponseHeaders {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any previous value.
    ///
    /// Names and values containing a newline are rejected with
    /// [`SwitchyardError::BadHeader`].
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> SwitchyardResult<()> {
        let value = value.into();
        if name.contains(['\n', '\r']) || value.contains(['\n', '\r']) {
            return Err(SwitchyardError::BadHeader(format!(
                "Header values can't contain newlines (got {value:?} for header {name:?})"
            )));
        }
        let key = name.to_ascii_lowercase();
        let original = self
            .entries
            .get(&key)
            .map_or_else(|| name.to_string(), |(orig, _)| orig.clone());
        self.entries.insert(key, (original, value));
        Ok(())
    }

    /// Sets `name` only when it isn't present yet.
    pub fn set_default(&mut self, name: &str, value: impl Into<String>) -> SwitchyardResult<()> {
        if self.contains(name) {
            Ok(())
        } else {
            self.set(name, value)
        }
    }

    /// Returns the value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` if `name` is set.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Removes `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    /// Iterates `(original_name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no headers are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
