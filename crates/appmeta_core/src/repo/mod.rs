//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the backing store contract consumed by the derivation engine.
//! - Isolate SQLite query details from façade orchestration.
//!
//! # Invariants
//! - Repositories persist raw values only; resolved values never reach storage.
//! - Repository APIs surface store failures as `RepoError`, never panics.

pub mod memory_repo;
pub mod metadata_repo;
