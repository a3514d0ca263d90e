//! Metadata repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide namespace-scoped CRUD over raw metadata rows.
//! - Answer "which rows reference `@KEY`" for change propagation.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - `find_by_reference_to` may over-approximate but must never miss a row
//!   whose raw text contains `@KEY`.
//! - Read paths reject undecodable persisted rows instead of masking them.
//!
//! # See also
//! - db/migrations/0001_app_metadata.sql

use crate::db::DbError;
use crate::model::value::{MetadataValue, ValueKind};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const METADATA_SELECT_SQL: &str = "SELECT
    entry_key,
    kind,
    raw_value
FROM app_metadata";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for metadata persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
    /// The store refused the operation without a transport-level error.
    Rejected(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted metadata: {message}"),
            Self::Rejected(message) => write!(f, "metadata store rejected operation: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::Rejected(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One persisted `(key, raw value)` pair of a namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub key: String,
    pub value: MetadataValue,
}

impl MetadataRow {
    pub fn new(key: impl Into<String>, value: MetadataValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Backing store interface consumed by the derivation engine and façade.
pub trait MetadataRepository {
    /// Returns every row of `app`, ordered by key.
    fn get_all(&self, app: &str) -> RepoResult<Vec<MetadataRow>>;
    /// Returns rows of `app` whose raw text contains `@key`.
    fn find_by_reference_to(&self, app: &str, key: &str) -> RepoResult<Vec<MetadataRow>>;
    /// Inserts or replaces the raw value of `key`.
    fn upsert(&self, app: &str, key: &str, value: &MetadataValue) -> RepoResult<()>;
    /// Removes `key`; removing an absent key succeeds.
    fn remove(&self, app: &str, key: &str) -> RepoResult<()>;
}

impl<T: MetadataRepository + ?Sized> MetadataRepository for &T {
    fn get_all(&self, app: &str) -> RepoResult<Vec<MetadataRow>> {
        (**self).get_all(app)
    }

    fn find_by_reference_to(&self, app: &str, key: &str) -> RepoResult<Vec<MetadataRow>> {
        (**self).find_by_reference_to(app, key)
    }

    fn upsert(&self, app: &str, key: &str, value: &MetadataValue) -> RepoResult<()> {
        (**self).upsert(app, key, value)
    }

    fn remove(&self, app: &str, key: &str) -> RepoResult<()> {
        (**self).remove(app, key)
    }
}

/// SQLite-backed metadata repository.
pub struct SqliteMetadataRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMetadataRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl MetadataRepository for SqliteMetadataRepository<'_> {
    fn get_all(&self, app: &str) -> RepoResult<Vec<MetadataRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{METADATA_SELECT_SQL}
             WHERE app = ?1
             ORDER BY entry_key ASC;"
        ))?;

        let mut rows = stmt.query([app])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_metadata_row(row)?);
        }

        Ok(entries)
    }

    fn find_by_reference_to(&self, app: &str, key: &str) -> RepoResult<Vec<MetadataRow>> {
        let pattern = format!("%@{}%", escape_like(key));
        let mut stmt = self.conn.prepare(&format!(
            "{METADATA_SELECT_SQL}
             WHERE app = ?1
               AND kind = 'text'
               AND raw_value LIKE ?2 ESCAPE '\\'
             ORDER BY entry_key ASC;"
        ))?;

        let mut rows = stmt.query(params![app, pattern])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_metadata_row(row)?);
        }

        Ok(entries)
    }

    fn upsert(&self, app: &str, key: &str, value: &MetadataValue) -> RepoResult<()> {
        let (kind, payload) = value.encode();
        self.conn.execute(
            "INSERT INTO app_metadata (app, entry_key, kind, raw_value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (app, entry_key) DO UPDATE SET
                kind = excluded.kind,
                raw_value = excluded.raw_value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![app, key, kind.as_str(), &*payload],
        )?;

        Ok(())
    }

    fn remove(&self, app: &str, key: &str) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM app_metadata WHERE app = ?1 AND entry_key = ?2;",
            params![app, key],
        )?;

        Ok(())
    }
}

fn parse_metadata_row(row: &Row<'_>) -> RepoResult<MetadataRow> {
    let key: String = row.get("entry_key")?;

    let kind_text: String = row.get("kind")?;
    let kind = ValueKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid kind `{kind_text}` for key `{key}` in app_metadata.kind"
        ))
    })?;

    let payload: String = row.get("raw_value")?;
    let value = MetadataValue::decode(kind, &payload).map_err(|message| {
        RepoError::InvalidData(format!("{message} for key `{key}` in app_metadata.raw_value"))
    })?;

    Ok(MetadataRow { key, value })
}

/// Escapes LIKE wildcards so `key` matches literally under `ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
