// src/config/mod.rs

//! Nested hyperparameter namespaces.
//!
//! A [`Config`] is a tree of namespaces: mapping values are sub-namespaces,
//! anything else is a parameter value. Parameters are addressed with
//! slash-separated keys (`"thresholding/sigma"`), and configurations are
//! combined with a recursive merge where the overriding side wins key by
//! key at every nesting depth.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    entries: Map<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    /// Wrap a JSON value. Non-mapping values yield an empty configuration.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(entries) => Self { entries },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }

    /// Value at a slash-separated key, or `None` if any segment is absent
    /// or a non-mapping is traversed.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('/');
        let first = segments.next()?;
        let mut current = self.entries.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Sub-namespace at `key`; empty if the key is absent or not a mapping.
    pub fn namespace(&self, key: &str) -> Config {
        match self.get(key) {
            Some(Value::Object(entries)) => Config {
                entries: entries.clone(),
            },
            _ => Config::default(),
        }
    }

    /// Set the value at a slash-separated key, creating intermediate
    /// namespaces as needed. Intermediate non-mapping values are replaced.
    pub fn set(&mut self, key: &str, value: Value) {
        let mut segments: Vec<&str> = key.split('/').collect();
        let last = segments.pop().unwrap_or(key);

        let mut current = &mut self.entries;
        for segment in segments {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = slot.as_object_mut().unwrap();
        }
        current.insert(last.to_string(), value);
    }

    /// Merge `other` into this configuration.
    ///
    /// Keys defined by `other` override, except that two mappings merge
    /// recursively; keys absent in `other` are retained at every depth.
    pub fn merge(&mut self, other: &Config) {
        merge_maps(&mut self.entries, &other.entries);
    }

    /// Like [`merge`](Self::merge), but returns a merged copy.
    pub fn merged(&self, other: &Config) -> Config {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Content digest of this configuration.
    ///
    /// Keys are stored sorted, so the digest is independent of insertion
    /// order and stable across processes.
    pub fn digest(&self) -> String {
        let canonical = serde_json::to_string(&self.entries).unwrap_or_default();
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

fn merge_maps(target: &mut Map<String, Value>, other: &Map<String, Value>) {
    for (key, value) in other {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Config {
        Config::from_value(value)
    }

    #[test]
    fn get_and_set_with_slash_keys() {
        let mut cfg = Config::new();
        cfg.set("seg/threshold", json!(5));
        cfg.set("seg/inner/sigma", json!(1.5));
        assert_eq!(cfg.get("seg/threshold"), Some(&json!(5)));
        assert_eq!(cfg.get("seg/inner/sigma"), Some(&json!(1.5)));
        assert_eq!(cfg.get("seg/missing"), None);
    }

    #[test]
    fn merge_overrides_only_defined_keys() {
        let mut base = config(json!({"seg": {"threshold": 5, "sigma": 2.0}, "export": {"fmt": "png"}}));
        let child = config(json!({"seg": {"threshold": 7}}));
        base.merge(&child);
        assert_eq!(base.get("seg/threshold"), Some(&json!(7)));
        assert_eq!(base.get("seg/sigma"), Some(&json!(2.0)));
        assert_eq!(base.get("export/fmt"), Some(&json!("png")));
    }

    #[test]
    fn merge_recurses_at_every_depth() {
        let mut base = config(json!({"a": {"b": {"c": 1, "d": 2}}}));
        let child = config(json!({"a": {"b": {"c": 10}}}));
        base.merge(&child);
        assert_eq!(base.get("a/b/c"), Some(&json!(10)));
        assert_eq!(base.get("a/b/d"), Some(&json!(2)));
    }

    #[test]
    fn merge_replaces_mapping_with_scalar_and_back() {
        let mut base = config(json!({"a": {"b": 1}}));
        base.merge(&config(json!({"a": 3})));
        assert_eq!(base.get("a"), Some(&json!(3)));

        let mut base = config(json!({"a": 3}));
        base.merge(&config(json!({"a": {"b": 1}})));
        assert_eq!(base.get("a/b"), Some(&json!(1)));
    }

    #[test]
    fn digest_is_order_independent_but_value_sensitive() {
        let mut first = Config::new();
        first.set("b", json!(2));
        first.set("a", json!(1));
        let mut second = Config::new();
        second.set("a", json!(1));
        second.set("b", json!(2));
        assert_eq!(first.digest(), second.digest());

        second.set("b", json!(3));
        assert_ne!(first.digest(), second.digest());
    }
}
