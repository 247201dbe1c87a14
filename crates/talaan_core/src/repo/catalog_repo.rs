//! Occupation catalog repository.
//!
//! # Responsibility
//! - Persist the occupation reference list used to label resident
//!   occupation codes.
//!
//! # Invariants
//! - Upsert is idempotent per code and refreshes the title in place.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CatalogRepoResult<T> = Result<T, CatalogRepoError>;

/// Errors from occupation catalog persistence.
#[derive(Debug)]
pub enum CatalogRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Code or title is blank.
    BlankField(&'static str),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for CatalogRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::BlankField(field) => write!(f, "occupation {field} must not be blank"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalog repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "catalog repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "catalog repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for CatalogRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::BlankField(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<DbError> for CatalogRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CatalogRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the occupation reference list.
pub trait OccupationCatalogRepository {
    /// Inserts or refreshes one occupation entry.
    fn upsert_occupation(&self, code: &str, title: &str) -> CatalogRepoResult<()>;
    /// Resolves an occupation code to its display title.
    fn occupation_title(&self, code: &str) -> CatalogRepoResult<Option<String>>;
}

/// SQLite-backed occupation catalog repository.
pub struct SqliteOccupationCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOccupationCatalogRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CatalogRepoResult<Self> {
        ensure_catalog_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl OccupationCatalogRepository for SqliteOccupationCatalogRepository<'_> {
    fn upsert_occupation(&self, code: &str, title: &str) -> CatalogRepoResult<()> {
        if code.trim().is_empty() {
            return Err(CatalogRepoError::BlankField("code"));
        }
        if title.trim().is_empty() {
            return Err(CatalogRepoError::BlankField("title"));
        }

        self.conn.execute(
            "INSERT INTO occupation_catalog (code, title)
             VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET
                title = excluded.title,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![code, title],
        )?;
        Ok(())
    }

    fn occupation_title(&self, code: &str) -> CatalogRepoResult<Option<String>> {
        let title = self
            .conn
            .query_row(
                "SELECT title FROM occupation_catalog WHERE code = ?1;",
                [code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(title)
    }
}

fn ensure_catalog_connection_ready(conn: &Connection) -> CatalogRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(CatalogRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "occupation_catalog")? {
        return Err(CatalogRepoError::MissingRequiredTable("occupation_catalog"));
    }
    for column in ["code", "title", "created_at", "updated_at"] {
        if !table_has_column(conn, "occupation_catalog", column)? {
            return Err(CatalogRepoError::MissingRequiredColumn {
                table: "occupation_catalog",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> CatalogRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> CatalogRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
