//! Scope-sequence allocation contracts and SQLite implementation.
//!
//! # Responsibility
//! - Hand out local sequence numbers for subdivision, street and house
//!   code groups.
//! - Keep allocation state in counter rows mutated atomically, never by
//!   scanning for a maximum.
//!
//! # Invariants
//! - Counters only move forward; numbers are never reused, even after
//!   soft deletes.
//! - A member key's assigned number is stable for the scope's lifetime.
//! - Every number fits one zero-padded four-digit code group (1..=9999).

use crate::db::migrations::latest_version;
use crate::db::{is_busy_error, DbError};
use crate::model::household::MAX_SEQUENCE_NUMBER;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SequenceResult<T> = Result<T, SequenceError>;

/// Errors from sequence allocation.
#[derive(Debug)]
pub enum SequenceError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Scope has handed out all 9999 numbers. Fatal for that scope.
    SequenceExhausted { scope_key: String },
    /// Allocation write lost a lock race; retry with a fresh transaction.
    ConcurrentConflict { scope_key: String },
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
    /// Persisted counter state cannot be interpreted.
    InvalidData(String),
}

impl Display for SequenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::SequenceExhausted { scope_key } => {
                write!(f, "sequence scope exhausted: {scope_key}")
            }
            Self::ConcurrentConflict { scope_key } => {
                write!(f, "concurrent allocation conflict in scope {scope_key}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "sequence allocator requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "sequence allocator requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "sequence allocator requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid sequence data: {message}"),
        }
    }
}

impl Error for SequenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::SequenceExhausted { .. } => None,
            Self::ConcurrentConflict { .. } => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for SequenceError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SequenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Scope key for subdivision numbers inside one barangay.
pub fn subdivision_scope_key(barangay_code: &str) -> String {
    format!("subd:{barangay_code}")
}

/// Scope key for street numbers inside one (barangay, subdivision group).
pub fn street_scope_key(barangay_code: &str, subdivision_seq: u16) -> String {
    format!("street:{barangay_code}:{subdivision_seq:04}")
}

/// Scope key for house numbers inside one (barangay, subdivision group,
/// street group).
pub fn house_scope_key(barangay_code: &str, subdivision_seq: u16, street_seq: u16) -> String {
    format!("house:{barangay_code}:{subdivision_seq:04}:{street_seq:04}")
}

/// Allocation interface for code sequence numbers.
pub trait SequenceAllocator {
    /// Returns the stable number for `member_key` inside `scope_key`,
    /// assigning the next free number on first sight.
    fn assigned_number(&self, scope_key: &str, member_key: &str) -> SequenceResult<u16>;
    /// Returns the next number in `scope_key`. Numbers only move forward.
    fn next_number(&self, scope_key: &str) -> SequenceResult<u16>;
}

/// SQLite-backed sequence allocator.
///
/// Callers run it inside their own IMMEDIATE transaction so the counter
/// bump commits or rolls back together with the row that consumed the
/// number.
#[derive(Debug)]
pub struct SqliteSequenceAllocator<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSequenceAllocator<'conn> {
    /// Creates allocator from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> SequenceResult<Self> {
        ensure_sequence_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SequenceAllocator for SqliteSequenceAllocator<'_> {
    fn assigned_number(&self, scope_key: &str, member_key: &str) -> SequenceResult<u16> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq_number
                 FROM scope_sequences
                 WHERE scope_key = ?1
                   AND member_key = ?2;",
                params![scope_key, member_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| map_allocation_error(err, scope_key))?;

        if let Some(number) = existing {
            return seq_from_db(number, scope_key);
        }

        let number = self.next_number(scope_key)?;
        self.conn
            .execute(
                "INSERT INTO scope_sequences (scope_key, member_key, seq_number)
                 VALUES (?1, ?2, ?3);",
                params![scope_key, member_key, i64::from(number)],
            )
            .map_err(|err| map_allocation_error(err, scope_key))?;
        Ok(number)
    }

    fn next_number(&self, scope_key: &str) -> SequenceResult<u16> {
        let allocated: i64 = self
            .conn
            .query_row(
                "INSERT INTO scope_counters (scope_key, last_value)
                 VALUES (?1, 1)
                 ON CONFLICT(scope_key) DO UPDATE SET last_value = last_value + 1
                 RETURNING last_value;",
                [scope_key],
                |row| row.get(0),
            )
            .map_err(|err| map_allocation_error(err, scope_key))?;

        if allocated > i64::from(MAX_SEQUENCE_NUMBER) {
            return Err(SequenceError::SequenceExhausted {
                scope_key: scope_key.to_string(),
            });
        }
        seq_from_db(allocated, scope_key)
    }
}

fn seq_from_db(value: i64, scope_key: &str) -> SequenceResult<u16> {
    if value < 1 || value > i64::from(MAX_SEQUENCE_NUMBER) {
        return Err(SequenceError::InvalidData(format!(
            "sequence number {value} out of range in scope {scope_key}"
        )));
    }
    Ok(value as u16)
}

fn map_allocation_error(err: rusqlite::Error, scope_key: &str) -> SequenceError {
    if is_busy_error(&err) {
        return SequenceError::ConcurrentConflict {
            scope_key: scope_key.to_string(),
        };
    }
    SequenceError::Db(DbError::Sqlite(err))
}

fn ensure_sequence_connection_ready(conn: &Connection) -> SequenceResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(SequenceError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "scope_counters")? {
        return Err(SequenceError::MissingRequiredTable("scope_counters"));
    }
    for column in ["scope_key", "last_value"] {
        if !table_has_column(conn, "scope_counters", column)? {
            return Err(SequenceError::MissingRequiredColumn {
                table: "scope_counters",
                column,
            });
        }
    }

    if !table_exists(conn, "scope_sequences")? {
        return Err(SequenceError::MissingRequiredTable("scope_sequences"));
    }
    for column in ["scope_key", "member_key", "seq_number"] {
        if !table_has_column(conn, "scope_sequences", column)? {
            return Err(SequenceError::MissingRequiredColumn {
                table: "scope_sequences",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> SequenceResult<bool> {
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

fn table_has_column(conn: &Connection, table: &str, column: &str) -> SequenceResult<bool> {
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

#[cfg(test)]
mod tests {
    use super::{house_scope_key, street_scope_key, subdivision_scope_key};

    #[test]
    fn scope_keys_are_positional_and_zero_padded() {
        assert_eq!(subdivision_scope_key("042114014"), "subd:042114014");
        assert_eq!(street_scope_key("042114014", 12), "street:042114014:0012");
        assert_eq!(street_scope_key("042114014", 0), "street:042114014:0000");
        assert_eq!(
            house_scope_key("042114014", 12, 3),
            "house:042114014:0012:0003"
        );
        assert_eq!(
            house_scope_key("042114014", 0, 0),
            "house:042114014:0000:0000"
        );
    }
}
