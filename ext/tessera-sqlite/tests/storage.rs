///
/// Blob streaming and backup through `ExtConnection`.
///

mod common;

use common::query_i64;
use tessera_core::{ExtError, ExtResult, ExtensionConfig};
use tessera_sqlite::{BackupProgress, ExtConnection, Whence};

fn with_payloads() -> ExtConnection {
    let conn = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
    conn.execute_batch(
        "CREATE TABLE payloads (id INTEGER PRIMARY KEY, data BLOB);
         INSERT INTO payloads (id, data) VALUES (1, zeroblob(10));",
    )
    .unwrap();
    conn
}

#[test]
fn test_blob_length_fixed_at_allocation() {
    let conn = with_payloads();
    let mut blob = conn.blob_open("payloads", "data", 1, false).unwrap();
    assert_eq!(blob.len().unwrap(), 10);

    blob.write(b"0123456789").unwrap();
    assert!(matches!(blob.write(b"x"), Err(ExtError::Validation(_))));

    blob.seek(-4, Whence::End).unwrap();
    assert_eq!(blob.read(100).unwrap(), b"6789");
    assert!(blob.read(1).unwrap().is_empty());
    assert!(blob.seek(11, Whence::Start).is_err());
    assert_eq!(blob.tell().unwrap(), 10);
    blob.close().unwrap();

    let len = query_i64(&conn, "SELECT length(data) FROM payloads WHERE id = 1");
    assert_eq!(len, vec![10]);
}

#[test]
fn test_blob_open_missing_targets() {
    let conn = with_payloads();
    for (table, column, rowid) in [("payloads", "data", 2), ("missing", "data", 1), ("payloads", "nope", 1)] {
        let err = conn.blob_open(table, column, rowid, true).err().unwrap();
        assert!(matches!(err, ExtError::NotFound { .. }), "{table}.{column}#{rowid}: {err}");
    }
}

#[test]
fn test_blob_after_row_delete() {
    let conn = with_payloads();
    let mut blob = conn.blob_open("payloads", "data", 1, true).unwrap();
    conn.execute_batch("DELETE FROM payloads WHERE id = 1").unwrap();
    assert!(blob.read(1).is_err());
    assert!(matches!(blob.read(1), Err(ExtError::State(_))));
}

#[test]
fn test_backup_between_connections() {
    let src = with_payloads();
    src.execute_batch("UPDATE payloads SET data = x'cafe' WHERE id = 1").unwrap();
    let mut dst = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
    dst.execute_batch("CREATE TABLE stale (x)").unwrap();

    src.backup_to(&mut dst, None).unwrap();

    let data: Vec<u8> = dst
        .connection()
        .query_row("SELECT data FROM payloads WHERE id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(data, vec![0xca, 0xfe]);
    assert_eq!(
        query_i64(&dst, "SELECT count(*) FROM sqlite_master WHERE name = 'stale'"),
        vec![0]
    );
}

#[test]
fn test_backup_to_file_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.db");

    let toml = "[backup]\npages_per_step = 2\nretry_sleep_ms = 10\n";
    let src = ExtConnection::open_in_memory(ExtensionConfig::from_toml_str(toml).unwrap()).unwrap();
    src.execute_batch(
        "CREATE TABLE big (x BLOB);
         WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 64)
         INSERT INTO big SELECT randomblob(1024) FROM n;",
    )
    .unwrap();

    let mut steps: Vec<BackupProgress> = Vec::new();
    let mut record = |p: BackupProgress| -> ExtResult<()> {
        steps.push(p);
        Ok(())
    };
    src.backup_to_file(&path, Some(&mut record)).unwrap();

    assert!(steps.len() > 1);
    let last = steps.last().unwrap();
    assert!(last.done);
    assert_eq!(last.remaining, 0);
    assert!(last.total > 0);

    let copy = ExtConnection::open(&path, ExtensionConfig::default()).unwrap();
    assert_eq!(query_i64(&copy, "SELECT count(*) FROM big"), vec![64]);
}

#[test]
fn test_backup_of_empty_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.db");
    let src = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
    src.backup_to_file(&path, None).unwrap();

    let copy = ExtConnection::open(&path, ExtensionConfig::default()).unwrap();
    assert_eq!(query_i64(&copy, "SELECT count(*) FROM sqlite_master"), vec![0]);
}

#[test]
fn test_progress_error_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cancelled.db");
    let mut config = ExtensionConfig::default();
    config.backup.pages_per_step = 1;
    let src = ExtConnection::open_in_memory(config).unwrap();
    src.execute_batch("CREATE TABLE a (x); CREATE TABLE b (y); CREATE TABLE c (z);")
        .unwrap();

    let mut cancel = |_p: BackupProgress| -> ExtResult<()> { Err(ExtError::State("cancelled".into())) };
    let err = src.backup_to_file(&path, Some(&mut cancel)).unwrap_err();
    assert!(matches!(err, ExtError::State(ref m) if m == "cancelled"));
}
