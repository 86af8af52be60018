use std::path::Path;
use std::sync::Arc;
use std::thread;

use rusqlite::Connection;
use tempfile::TempDir;
use zoopeek_core::CellValue;
use zoopeek_io::{ChannelRegistry, QueryError, SnapshotLayout, StorageError, UserId, NO_STATEMENT};

fn write_snapshot(path: &Path, owner: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE animals (animal_id INTEGER PRIMARY KEY, animal_name TEXT, animal_emoji TEXT, weight REAL, tag BLOB);
         INSERT INTO animals VALUES (1, 'Bat', '🦇', 0.5, x'CAFE');
         INSERT INTO animals VALUES (2, 'Dragon', '🐉', NULL, NULL);
         CREATE TABLE owner (name TEXT);",
    )
    .unwrap();
    conn.execute("INSERT INTO owner VALUES (?1)", [owner]).unwrap();
}

fn shared() -> (TempDir, ChannelRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zoo.sqlite");
    write_snapshot(&path, "everyone");
    (dir, ChannelRegistry::new(SnapshotLayout::Shared(path)))
}

#[test]
fn select_materializes_columns_and_rows() {
    let (_dir, registry) = shared();
    let ch = registry.channel(&UserId::new("alice")).unwrap();
    let rs = ch
        .execute("SELECT animal_id, animal_name, animal_emoji, weight, tag FROM animals ORDER BY animal_id")
        .unwrap();
    assert_eq!(rs.columns(), ["animal_id", "animal_name", "animal_emoji", "weight", "tag"]);
    assert_eq!(rs.len(), 2);
    assert_eq!(rs.rows()[0][0], CellValue::Integer(1));
    assert_eq!(rs.rows()[0][2], CellValue::from("🦇"));
    assert_eq!(rs.rows()[0][3], CellValue::Real(0.5));
    assert_eq!(rs.rows()[0][4], CellValue::Blob(vec![0xCA, 0xFE]));
    assert_eq!(rs.rows()[1][3], CellValue::Null);
}

#[test]
fn channel_is_cached_per_user() {
    let (_dir, registry) = shared();
    let alice = UserId::new("alice");
    let a1 = registry.channel(&alice).unwrap();
    let a2 = registry.channel(&alice).unwrap();
    let b = registry.channel(&UserId::new("bob")).unwrap();
    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    assert_eq!(registry.len(), 2);

    assert!(registry.invalidate(&alice));
    assert!(!registry.invalidate(&alice));
    let a3 = registry.channel(&alice).unwrap();
    assert!(!Arc::ptr_eq(&a1, &a3));
}

#[test]
fn writes_are_rejected_by_the_engine() {
    let (_dir, registry) = shared();
    let ch = registry.channel(&UserId::new("alice")).unwrap();
    for sql in [
        "INSERT INTO animals (animal_name) VALUES ('Cat')",
        "UPDATE animals SET animal_name = 'x'",
        "DELETE FROM animals",
        "CREATE TABLE t (x)",
        "DROP TABLE animals",
    ] {
        let err = ch.execute(sql).unwrap_err();
        assert!(err.code.is_some(), "{sql}: {err:?}");
    }
    let rs = ch.execute("SELECT COUNT(*) FROM animals").unwrap();
    assert_eq!(rs.rows()[0][0], CellValue::Integer(2));
}

#[test]
fn attach_is_disabled() {
    let (dir, registry) = shared();
    let other = dir.path().join("other.sqlite");
    write_snapshot(&other, "bob");
    let ch = registry.channel(&UserId::new("alice")).unwrap();
    let sql = format!("ATTACH DATABASE '{}' AS other", other.display());
    assert!(ch.execute(&sql).is_err());
}

#[test]
fn query_errors_carry_engine_code() {
    let (_dir, registry) = shared();
    let ch = registry.channel(&UserId::new("alice")).unwrap();

    let err = ch.execute("SELECT * FROM nope").unwrap_err();
    assert_eq!(err.code.as_deref(), Some("SQLITE_ERROR"));
    assert_eq!(err.message, "no such table: nope");

    let err = ch.execute("SELEC 1").unwrap_err();
    assert_eq!(err.code.as_deref(), Some("SQLITE_ERROR"));
    assert!(err.message.contains("syntax error"));

    // Only one statement per request
    let err = ch.execute("SELECT 1; SELECT 2").unwrap_err();
    assert_eq!(err.code, None);
    assert_eq!(err, QueryError::from(rusqlite::Error::MultipleStatement));
    let err = ch.execute("SELECT 1;\n-- trailing\nDELETE FROM owner").unwrap_err();
    assert_eq!(err, QueryError::from(rusqlite::Error::MultipleStatement));

    // A trailing semicolon or comment is still one statement
    let rs = ch.execute("SELECT 1 AS n; -- done").unwrap();
    assert_eq!(rs.rows(), &[vec![CellValue::from(1)]]);
}

#[test]
fn empty_text_is_not_a_statement() {
    let (_dir, registry) = shared();
    let ch = registry.channel(&UserId::new("alice")).unwrap();

    for sql in ["", "   \n", "-- only a comment", "/* x */ ;"] {
        let err = ch.execute(sql).unwrap_err();
        assert_eq!(err, QueryError::new(None, NO_STATEMENT), "{sql:?}");
    }
}

#[test]
fn per_user_snapshots_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(&dir.path().join("alice.sqlite"), "alice");
    write_snapshot(&dir.path().join("bob.sqlite"), "bob");
    let registry = ChannelRegistry::new(SnapshotLayout::PerUser { dir: dir.path().to_path_buf() });

    let owner = |user: &str| {
        let rs = registry
            .channel(&UserId::new(user))
            .unwrap()
            .execute("SELECT name FROM owner")
            .unwrap();
        rs.rows()[0][0].clone()
    };
    assert_eq!(owner("alice"), CellValue::from("alice"));
    assert_eq!(owner("bob"), CellValue::from("bob"));
}

#[test]
fn missing_snapshot_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ChannelRegistry::new(SnapshotLayout::PerUser { dir: dir.path().to_path_buf() });
    let err = registry.channel(&UserId::new("carol")).unwrap_err();
    assert!(matches!(err, StorageError::Open { .. }));
    assert!(!dir.path().join("carol.sqlite").exists());
    assert!(registry.is_empty());
}

#[test]
fn committed_writes_are_visible_without_reopening() {
    let (dir, registry) = shared();
    let ch = registry.channel(&UserId::new("alice")).unwrap();
    assert_eq!(ch.execute("SELECT COUNT(*) FROM animals").unwrap().rows()[0][0], CellValue::Integer(2));

    let rw = Connection::open(dir.path().join("zoo.sqlite")).unwrap();
    rw.execute("INSERT INTO animals (animal_name) VALUES ('Cat')", []).unwrap();
    drop(rw);

    assert_eq!(ch.execute("SELECT COUNT(*) FROM animals").unwrap().rows()[0][0], CellValue::Integer(3));
}

#[test]
fn users_query_in_parallel() {
    let (_dir, registry) = shared();
    thread::scope(|s| {
        for user in ["a", "b", "c", "d"] {
            let registry = &registry;
            s.spawn(move || {
                let id = UserId::new(user);
                for _ in 0..20 {
                    let rs = registry.channel(&id).unwrap().execute("SELECT animal_name FROM animals").unwrap();
                    assert_eq!(rs.len(), 2);
                }
            });
        }
    });
    assert_eq!(registry.len(), 4);
}

#[test]
fn same_user_requests_share_one_channel() {
    let (_dir, registry) = shared();
    let id = UserId::new("alice");
    let channels: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| registry.channel(&id).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(channels.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(registry.len(), 1);
}
