//! In-memory metadata repository.
//!
//! Used by tests and by embedders that do not need durability. Write failures
//! can be switched on to exercise persistence-error paths.

use crate::model::value::MetadataValue;
use crate::repo::metadata_repo::{MetadataRepository, MetadataRow, RepoError, RepoResult};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// `BTreeMap`-backed repository keyed by `(app, key)`.
#[derive(Debug, Default)]
pub struct MemoryMetadataRepository {
    rows: RefCell<BTreeMap<(String, String), MetadataValue>>,
    reject_writes: Cell<bool>,
    reject_reads: Cell<bool>,
}

impl MemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `upsert`/`remove` calls fail with `RepoError::Rejected`.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.set(reject);
    }

    /// Makes subsequent `get_all`/`find_by_reference_to` calls fail.
    pub fn set_reject_reads(&self, reject: bool) {
        self.reject_reads.set(reject);
    }

    /// Returns the persisted raw value, bypassing any resolution.
    pub fn raw(&self, app: &str, key: &str) -> Option<MetadataValue> {
        self.rows
            .borrow()
            .get(&(app.to_string(), key.to_string()))
            .cloned()
    }

    fn check_read(&self) -> RepoResult<()> {
        if self.reject_reads.get() {
            return Err(RepoError::Rejected("reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> RepoResult<()> {
        if self.reject_writes.get() {
            return Err(RepoError::Rejected("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl MetadataRepository for MemoryMetadataRepository {
    fn get_all(&self, app: &str) -> RepoResult<Vec<MetadataRow>> {
        self.check_read()?;
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|((row_app, _), _)| row_app == app)
            .map(|((_, key), value)| MetadataRow::new(key.clone(), value.clone()))
            .collect())
    }

    fn find_by_reference_to(&self, app: &str, key: &str) -> RepoResult<Vec<MetadataRow>> {
        self.check_read()?;
        let needle = format!("@{key}");
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|((row_app, _), value)| {
                row_app == app && value.as_text().is_some_and(|text| text.contains(&needle))
            })
            .map(|((_, row_key), value)| MetadataRow::new(row_key.clone(), value.clone()))
            .collect())
    }

    fn upsert(&self, app: &str, key: &str, value: &MetadataValue) -> RepoResult<()> {
        self.check_write()?;
        self.rows
            .borrow_mut()
            .insert((app.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    fn remove(&self, app: &str, key: &str) -> RepoResult<()> {
        self.check_write()?;
        self.rows
            .borrow_mut()
            .remove(&(app.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryMetadataRepository;
    use crate::model::value::MetadataValue;
    use crate::repo::metadata_repo::{MetadataRepository, RepoError};

    #[test]
    fn rows_are_scoped_by_app() {
        let repo = MemoryMetadataRepository::new();
        repo.upsert("one", "A", &MetadataValue::text("1")).unwrap();
        repo.upsert("two", "A", &MetadataValue::text("2")).unwrap();

        let rows = repo.get_all("one").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, MetadataValue::text("1"));
    }

    #[test]
    fn find_by_reference_over_approximates_prefix_matches() {
        let repo = MemoryMetadataRepository::new();
        repo.upsert("app", "B", &MetadataValue::text("@A/bar")).unwrap();
        repo.upsert("app", "C", &MetadataValue::text("@AB")).unwrap();
        repo.upsert("app", "D", &MetadataValue::Bool(true)).unwrap();

        let keys = repo
            .find_by_reference_to("app", "A")
            .unwrap()
            .into_iter()
            .map(|row| row.key)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["B", "C"]);
    }

    #[test]
    fn rejected_writes_leave_rows_untouched() {
        let repo = MemoryMetadataRepository::new();
        repo.upsert("app", "A", &MetadataValue::text("1")).unwrap();
        repo.set_reject_writes(true);

        let err = repo.upsert("app", "A", &MetadataValue::text("2")).unwrap_err();
        assert!(matches!(err, RepoError::Rejected(_)));
        assert!(repo.remove("app", "A").is_err());
        assert_eq!(repo.raw("app", "A"), Some(MetadataValue::text("1")));
    }
}
