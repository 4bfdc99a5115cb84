//! Free-form key/value metadata attached to libraries, documents, and chunks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata as ordered key/value pairs.
///
/// Values are arbitrary JSON, so callers can attach strings, numbers, tags,
/// or nested structures without a fixed schema. A `BTreeMap` keeps iteration
/// and serialization order stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    /// Create empty metadata.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Get the value for a key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a key/value pair, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the metadata is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_and_get() {
        let mut meta = Metadata::new();
        assert!(meta.is_empty());

        meta.insert("author", "ada");
        meta.insert("page", 3);

        assert_eq!(meta.get("author"), Some(&json!("ada")));
        assert_eq!(meta.get("page"), Some(&json!(3)));
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn serializes_transparently() {
        let mut meta = Metadata::new();
        meta.insert("lang", "en");

        let encoded = serde_json::to_string(&meta).expect("serialize");
        assert_eq!(encoded, r#"{"lang":"en"}"#);

        let decoded: Metadata = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, meta);
    }
}
