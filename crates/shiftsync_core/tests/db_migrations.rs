use shiftsync_core::db::migrations::latest_version;
use shiftsync_core::db::{open_db, open_db_in_memory, DbError};
use shiftsync_core::{RepoError, SqliteRoleRepository, SqliteShiftTypeRepository};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "shift_categories",
        "roles",
        "position_types",
        "shift_types",
        "shift_positions",
        "shift_times",
        "shift_volunteers",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shiftsync.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "shift_types");
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

    let err = SqliteShiftTypeRepository::try_new(&conn).err().unwrap();
    match err {
        RepoError::Db(DbError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(SqliteRoleRepository::try_new(&conn).is_err());
}

#[test]
fn live_role_names_are_unique_ignoring_case() {
    let conn = open_db_in_memory().unwrap();
    conn.execute("INSERT INTO roles (name) VALUES ('Lead');", [])
        .unwrap();
    assert!(conn
        .execute("INSERT INTO roles (name) VALUES ('LEAD');", [])
        .is_err());

    conn.execute("UPDATE roles SET removed = 1;", []).unwrap();
    conn.execute("INSERT INTO roles (name) VALUES ('LEAD');", [])
        .unwrap();
}

#[test]
fn one_live_position_per_type_within_a_shift_type() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO position_types (id, name) VALUES (10, 'Lead');
         INSERT INTO shift_types (id, name) VALUES (1, 'Gate'), (2, 'Greeters');
         INSERT INTO shift_positions (id, shift_type_id, position_type_id) VALUES (1, 1, 10);",
    )
    .unwrap();
    assert!(conn
        .execute(
            "INSERT INTO shift_positions (id, shift_type_id, position_type_id) VALUES (2, 1, 10);",
            [],
        )
        .is_err());
    conn.execute(
        "INSERT INTO shift_positions (id, shift_type_id, position_type_id) VALUES (3, 2, 10);",
        [],
    )
    .unwrap();

    conn.execute("UPDATE shift_positions SET removed = 1 WHERE id = 1;", [])
        .unwrap();
    conn.execute(
        "INSERT INTO shift_positions (id, shift_type_id, position_type_id) VALUES (2, 1, 10);",
        [],
    )
    .unwrap();
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
