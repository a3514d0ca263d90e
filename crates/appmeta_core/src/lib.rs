//! Core logic for app metadata: a persisted key-value map whose text values
//! may reference sibling keys as `@KEY`, resolved transparently on read.

pub mod db;
pub mod derive;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use derive::engine::{
    collect_affected, propagate, resolve, DependencyGraph, Propagation, Resolution,
    UnresolvableReference,
};
pub use derive::scanner::{find_references, has_references, Reference};
pub use derive::view::ResolvedView;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::value::{MetadataValue, ValueKind};
pub use repo::memory_repo::MemoryMetadataRepository;
pub use repo::metadata_repo::{
    MetadataRepository, MetadataRow, RepoError, RepoResult, SqliteMetadataRepository,
};
pub use service::metadata_service::{AppMetadata, MetadataError, MetadataResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
