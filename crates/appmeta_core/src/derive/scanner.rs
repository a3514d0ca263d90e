//! Reference token scanner.
//!
//! A reference is `@` followed by one or more ASCII word characters
//! (`[A-Za-z0-9_]`). There is no escape syntax: every such substring in a text
//! value is treated as a reference.

use once_cell::sync::Lazy;
use regex::Regex;

static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("valid reference regex"));

/// One reference occurrence inside a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    /// Full token text including the leading `@`.
    pub token: &'a str,
    /// Referenced key (token without `@`).
    pub key: &'a str,
    /// Byte offset of the token start.
    pub start: usize,
    /// Byte offset one past the token end.
    pub end: usize,
}

/// Returns every reference in `value`, in left-to-right occurrence order.
///
/// Repeated references to the same key are reported once per occurrence.
pub fn find_references(value: &str) -> Vec<Reference<'_>> {
    REFERENCE_RE
        .captures_iter(value)
        .filter_map(|captures| {
            let token = captures.get(0)?;
            let key = captures.get(1)?;
            Some(Reference {
                token: token.as_str(),
                key: key.as_str(),
                start: token.start(),
                end: token.end(),
            })
        })
        .collect()
}

/// Returns whether `value` contains at least one reference token.
pub fn has_references(value: &str) -> bool {
    REFERENCE_RE.is_match(value)
}

/// Returns whether `value` references exactly `key` (not a longer key that
/// merely starts with it).
pub fn references_key(value: &str, key: &str) -> bool {
    REFERENCE_RE
        .captures_iter(value)
        .any(|captures| captures.get(1).is_some_and(|found| found.as_str() == key))
}
