use rusqlite::Connection;
use talaan_core::db::migrations::latest_version;
use talaan_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "geo_nodes");
    assert_table_exists(&conn, "scope_counters");
    assert_table_exists(&conn, "scope_sequences");
    assert_table_exists(&conn, "households");
    assert_table_exists(&conn, "residents");
    assert_table_exists(&conn, "household_members");
    assert_table_exists(&conn, "occupation_catalog");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("talaan.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "households");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repositories_reject_unmigrated_connections() {
    let conn = Connection::open_in_memory().unwrap();

    let err = talaan_core::repo::geo_repo::SqliteGeoTreeRepository::try_new(&conn).unwrap_err();
    assert!(matches!(
        err,
        talaan_core::repo::geo_repo::GeoRepoError::UninitializedConnection { .. }
    ));

    let err =
        talaan_core::repo::household_repo::SqliteHouseholdRepository::try_new(&conn).unwrap_err();
    assert!(matches!(
        err,
        talaan_core::repo::household_repo::HouseholdRepoError::UninitializedConnection { .. }
    ));

    let err =
        talaan_core::repo::resident_repo::SqliteResidentRepository::try_new(&conn).unwrap_err();
    assert!(matches!(
        err,
        talaan_core::repo::resident_repo::ResidentRepoError::UninitializedConnection { .. }
    ));

    let err =
        talaan_core::repo::sequence_repo::SqliteSequenceAllocator::try_new(&conn).unwrap_err();
    assert!(matches!(
        err,
        talaan_core::repo::sequence_repo::SequenceError::UninitializedConnection { .. }
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
