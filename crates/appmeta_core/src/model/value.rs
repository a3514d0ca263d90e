//! Metadata value model.
//!
//! # Responsibility
//! - Represent raw and resolved values (`text | bool | blob`).
//! - Render non-text values when they are substituted into a template.
//!
//! # Invariants
//! - `Bool` and `Blob` values pass through resolution untouched.
//! - Boolean rendering uses the `TRUE` / `FALSE` literals of the storage format.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{Display, Formatter};

/// Literal used for `true` in storage and template rendering.
pub const TRUE_LITERAL: &str = "TRUE";
/// Literal used for `false` in storage and template rendering.
pub const FALSE_LITERAL: &str = "FALSE";

/// One metadata value, either as written by a caller (raw) or after
/// reference substitution (resolved).
///
/// Serializes as `{"kind": "text", "value": "..."}` for JSON exports; the
/// SQLite columns use [`MetadataValue::encode`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    /// Plain or templated string. The only variant scanned for `@KEY` tokens.
    Text(String),
    /// Boolean flag.
    Bool(bool),
    /// Opaque serializable payload, never scanned even if it contains `@`.
    Blob(serde_json::Value),
}

/// Storage discriminator for [`MetadataValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Bool,
    Blob,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Bool => "bool",
            Self::Blob => "blob",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "bool" => Some(Self::Bool),
            "blob" => Some(Self::Blob),
            _ => None,
        }
    }
}

impl MetadataValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Bool(_) => ValueKind::Bool,
            Self::Blob(_) => ValueKind::Blob,
        }
    }

    /// Returns the string payload for `Text` values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Renders this value the way it appears when substituted for a reference.
    ///
    /// Booleans render as `TRUE` / `FALSE`, the same literals used in storage,
    /// rather than the `"1"` / `""` a loose string cast would give. A
    /// substituted `false` never collapses to an empty string.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Self::Text(value) => Cow::Borrowed(value.as_str()),
            Self::Bool(true) => Cow::Borrowed(TRUE_LITERAL),
            Self::Bool(false) => Cow::Borrowed(FALSE_LITERAL),
            Self::Blob(value) => Cow::Owned(value.to_string()),
        }
    }

    /// Encodes this value into its `(kind, payload)` storage columns.
    pub fn encode(&self) -> (ValueKind, Cow<'_, str>) {
        (self.kind(), self.render())
    }

    /// Decodes a stored `(kind, payload)` pair.
    ///
    /// # Errors
    /// - Returns a message when a `bool` payload is not `TRUE`/`FALSE`.
    /// - Returns a message when a `blob` payload is not valid JSON.
    pub fn decode(kind: ValueKind, payload: &str) -> Result<Self, String> {
        match kind {
            ValueKind::Text => Ok(Self::Text(payload.to_string())),
            ValueKind::Bool => match payload {
                TRUE_LITERAL => Ok(Self::Bool(true)),
                FALSE_LITERAL => Ok(Self::Bool(false)),
                other => Err(format!("invalid boolean payload `{other}`")),
            },
            ValueKind::Blob => serde_json::from_str(payload)
                .map(Self::Blob)
                .map_err(|err| format!("invalid blob payload: {err}")),
        }
    }
}

impl Display for MetadataValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<serde_json::Value> for MetadataValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Blob(value)
    }
}
