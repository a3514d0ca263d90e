//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and derivation into container-level APIs.
//! - Keep CLI/embedding layers decoupled from storage details.

pub mod metadata_service;
