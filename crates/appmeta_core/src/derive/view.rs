//! In-memory resolved view.
//!
//! Holds the current resolved value per key. Readers go through this cache;
//! only the derivation engine and the façade write to it.

use crate::model::value::MetadataValue;
use std::collections::BTreeMap;

/// Key to resolved value mapping, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedView {
    entries: BTreeMap<String, MetadataValue>,
}

impl ResolvedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    /// Inserts or replaces the resolved value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.entries.insert(key.into(), value);
    }

    /// Removes `key`, returning its last resolved value.
    pub fn delete(&mut self, key: &str) -> Option<MetadataValue> {
        self.entries.remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }
}
