//! App metadata façade.
//!
//! # Responsibility
//! - Present one app namespace as an associative container whose reads are
//!   always fully resolved.
//! - Persist raw values through a [`MetadataRepository`] and keep the
//!   resolved view in step through the derivation engine.
//!
//! # Invariants
//! - Write-then-cache: the view changes only after the store accepted the
//!   write, so a failed `set`/`delete` leaves the view untouched.
//! - After `set`/`delete` returns `Ok`, no dependent of the changed key holds
//!   a stale resolved value.
//! - Mutations take `&mut self`: one writer per namespace at a time.
//! - Keys left unresolved by earlier operations stay pending for later ones,
//!   so a session's view always equals what a fresh load would produce.

use crate::derive::engine::{self, DependencyGraph, Propagation};
use crate::derive::view::ResolvedView;
use crate::model::value::MetadataValue;
use crate::repo::metadata_repo::{MetadataRepository, RepoError};
use log::{info, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Façade error for app metadata operations.
#[derive(Debug)]
pub enum MetadataError {
    /// The namespace could not be loaded from the store.
    ConstructionFailed(RepoError),
    /// The store rejected a write or delete; in-memory state is unchanged.
    PersistFailed { key: String, source: RepoError },
    /// Dependents of a key could not be queried; nothing was written.
    StoreUnavailable(RepoError),
    /// The key was never set or has been deleted.
    NotFound(String),
    /// Keys must be non-empty.
    InvalidKey(String),
}

impl Display for MetadataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstructionFailed(err) => write!(f, "unable to load app metadata: {err}"),
            Self::PersistFailed { key, source } => {
                write!(f, "unable to persist app metadata `{key}`: {source}")
            }
            Self::StoreUnavailable(err) => write!(f, "app metadata store unavailable: {err}"),
            Self::NotFound(key) => write!(f, "app metadata not found: `{key}`"),
            Self::InvalidKey(key) => write!(f, "invalid app metadata key: `{key}`"),
        }
    }
}

impl Error for MetadataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConstructionFailed(err) => Some(err),
            Self::PersistFailed { source, .. } => Some(source),
            Self::StoreUnavailable(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidKey(_) => None,
        }
    }
}

/// Persisted key-value map with `@KEY` reference derivation.
pub struct AppMetadata<R: MetadataRepository> {
    repo: R,
    app: String,
    view: ResolvedView,
    stuck: BTreeSet<String>,
}

impl<R: MetadataRepository> AppMetadata<R> {
    /// Loads every row of `app` and resolves derived values to a fixed point.
    ///
    /// # Errors
    /// - Returns `ConstructionFailed` when the store cannot list the namespace.
    pub fn load(repo: R, app: impl Into<String>) -> MetadataResult<Self> {
        let app = app.into();
        let started_at = Instant::now();

        let rows = repo.get_all(&app).map_err(|err| {
            warn!(
                "event=metadata_load module=service status=error error_code=store_unavailable error={}",
                err
            );
            MetadataError::ConstructionFailed(err)
        })?;
        let row_count = rows.len();

        let mut view = ResolvedView::new();
        let graph = engine::classify_rows(rows, &mut view);
        let derived_count = graph.len();
        let report = graph.settle(&mut view);

        let mut metadata = Self {
            repo,
            app,
            view,
            stuck: BTreeSet::new(),
        };
        metadata.record(&report, "metadata_load", None);

        info!(
            "event=metadata_load module=service status=ok rows={} derived={} passes={} duration_ms={}",
            row_count,
            derived_count,
            report.passes,
            started_at.elapsed().as_millis()
        );
        Ok(metadata)
    }

    /// Namespace this map is bound to.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Returns the resolved value of `key`.
    pub fn get(&self, key: &str) -> MetadataResult<&MetadataValue> {
        self.view
            .get(key)
            .ok_or_else(|| MetadataError::NotFound(key.to_string()))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.view.has(key)
    }

    /// Persists `value` as the raw value of `key` and re-resolves `key` and
    /// every entry that depends on it, directly or transitively.
    ///
    /// # Errors
    /// - `InvalidKey` for an empty key.
    /// - `StoreUnavailable` when dependents cannot be queried (nothing written).
    /// - `PersistFailed` when the store rejects the write.
    pub fn set(&mut self, key: &str, value: impl Into<MetadataValue>) -> MetadataResult<()> {
        validate_key(key)?;
        let value = value.into();

        let graph = engine::collect_affected(&self.repo, &self.app, key, Some(&value))
            .map_err(MetadataError::StoreUnavailable)?;

        if let Err(err) = self.repo.upsert(&self.app, key, &value) {
            warn!(
                "event=metadata_set module=service status=error key={} error_code=persist_failed error={}",
                key, err
            );
            return Err(MetadataError::PersistFailed {
                key: key.to_string(),
                source: err,
            });
        }

        let report = self.settle(&graph, key);
        self.record(&report, "metadata_set", Some(key));
        info!(
            "event=metadata_set module=service status=ok key={} kind={} affected={} passes={}",
            key,
            value.kind().as_str(),
            graph.len(),
            report.passes
        );
        Ok(())
    }

    /// Deletes `key` and re-resolves its dependents, whose references to it
    /// become literal text. Deleting an absent key succeeds.
    ///
    /// # Errors
    /// - `StoreUnavailable` when dependents cannot be queried (nothing deleted).
    /// - `PersistFailed` when the store rejects the delete.
    pub fn delete(&mut self, key: &str) -> MetadataResult<()> {
        let graph = engine::collect_affected(&self.repo, &self.app, key, None)
            .map_err(MetadataError::StoreUnavailable)?;

        if let Err(err) = self.repo.remove(&self.app, key) {
            warn!(
                "event=metadata_delete module=service status=error key={} error_code=persist_failed error={}",
                key, err
            );
            return Err(MetadataError::PersistFailed {
                key: key.to_string(),
                source: err,
            });
        }

        let existed = self.view.delete(key).is_some();
        let report = self.settle(&graph, key);
        self.record(&report, "metadata_delete", Some(key));
        info!(
            "event=metadata_delete module=service status=ok key={} existed={} affected={}",
            key,
            existed,
            graph.len()
        );
        Ok(())
    }

    /// Resolves an arbitrary template against the current values without
    /// storing anything.
    pub fn derive_value(&self, template: &str) -> String {
        engine::resolve_text(template, &self.view)
    }

    /// Keys currently holding partially resolved values, ordered by key.
    pub fn unresolved(&self) -> Vec<String> {
        self.stuck.iter().cloned().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.view.keys()
    }

    /// Resolved entries ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.view.iter()
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    pub fn view(&self) -> &ResolvedView {
        &self.view
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Settles `graph` with every stuck key outside it held pending.
    fn settle(&mut self, graph: &DependencyGraph, changed_key: &str) -> Propagation {
        self.stuck.remove(changed_key);
        for key in graph.keys() {
            self.stuck.remove(key);
        }
        let stuck = &self.stuck;
        graph.settle_with(&mut self.view, |key| stuck.contains(key))
    }

    fn record(&mut self, report: &Propagation, event: &str, key: Option<&str>) {
        self.stuck.extend(report.unresolved_keys().iter().cloned());
        if let Some(unresolved) = &report.unresolved {
            warn!(
                "event=unresolvable_reference module=service status=partial trigger={} key={} app={} detail={}",
                event,
                key.unwrap_or("-"),
                self.app,
                unresolved
            );
        }
    }
}

fn validate_key(key: &str) -> MetadataResult<()> {
    if key.is_empty() {
        return Err(MetadataError::InvalidKey(key.to_string()));
    }
    Ok(())
}
