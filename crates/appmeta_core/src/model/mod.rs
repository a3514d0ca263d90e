//! Value model for app metadata entries.
//!
//! # Responsibility
//! - Define the tagged value shape persisted per `(app, key)`.
//! - Keep rendering rules for template substitution in one place.
//!
//! # Invariants
//! - Only `MetadataValue::Text` is ever scanned for references.

pub mod value;
