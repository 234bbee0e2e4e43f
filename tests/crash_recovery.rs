//! # Crash Recovery Test
//!
//! Simulates crashes by dropping the `Database` handle without `close` (no
//! final checkpoint), then reopening. Auto-checkpoint is disabled so the
//! redo log keeps the entries a crash would strand.

use minidb::{Column, Condition, Database, DatabaseConfig, SetClause, Value};
use tempfile::tempdir;

fn crash_prone_config(dir: &std::path::Path) -> DatabaseConfig {
    DatabaseConfig::new(dir.join("db"))
        .page_size(256)
        .cache_pages(16)
        .auto_checkpoint(false)
}

#[test]
fn inserts_survive_crash_and_log_is_truncated() {
    let dir = tempdir().unwrap();
    let config = crash_prone_config(dir.path());

    {
        let db = Database::open(config.clone()).unwrap();
        db.create_table("t", vec![Column::int("id")]).unwrap();
        for i in 1..=5 {
            db.insert("t", vec![Value::Int(i)]).unwrap();
        }
        // Crash: drop without close/checkpoint.
    }

    let log_path = dir.path().join("db/db.log");
    assert!(std::fs::read_to_string(&log_path).unwrap().lines().count() >= 5);

    let db = Database::open(config).unwrap();
    let rows = db.select("t", None).unwrap();
    assert_eq!(
        rows,
        (1..=5).map(|i| vec![Value::Int(i)]).collect::<Vec<_>>()
    );

    // Recovery ends with an empty log.
    assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "");
}

#[test]
fn updates_and_deletes_replay_in_order() {
    let dir = tempdir().unwrap();
    let config = crash_prone_config(dir.path());

    {
        let db = Database::open(config.clone()).unwrap();
        db.create_table("t", vec![Column::int("id"), Column::text("name", 8)])
            .unwrap();
        db.insert("t", vec![Value::Int(1), Value::text("a")]).unwrap();
        db.insert("t", vec![Value::Int(2), Value::text("b")]).unwrap();
        db.update(
            "t",
            &[SetClause::new("name", Value::text("a2"))],
            Some(&Condition::equals("id", Value::Int(1))),
        )
        .unwrap();
        db.delete("t", Some(&Condition::equals("id", Value::Int(2))))
            .unwrap();
    }

    let db = Database::open(config).unwrap();
    let rows = db.select("t", None).unwrap();
    assert_eq!(rows, vec![vec![Value::Int(1), Value::text("a2")]]);
}

#[test]
fn recovered_tombstones_feed_the_free_list() {
    let dir = tempdir().unwrap();
    let config = crash_prone_config(dir.path());

    {
        let db = Database::open(config.clone()).unwrap();
        db.create_table("t", vec![Column::int("id")]).unwrap();
        db.insert("t", vec![Value::Int(1)]).unwrap();
        db.insert("t", vec![Value::Int(2)]).unwrap();
        db.delete("t", Some(&Condition::equals("id", Value::Int(1))))
            .unwrap();
    }

    let db = Database::open(config).unwrap();
    // Slot 0 was tombstoned before the crash; the next insert reuses it.
    let row_id = db.insert("t", vec![Value::Int(3)]).unwrap();
    assert_eq!(row_id, 0);
    assert_eq!(
        db.select("t", None).unwrap(),
        vec![vec![Value::Int(3)], vec![Value::Int(2)]]
    );
}

#[test]
fn recovery_is_idempotent_across_double_crash() {
    let dir = tempdir().unwrap();
    let config = crash_prone_config(dir.path());

    {
        let db = Database::open(config.clone()).unwrap();
        db.create_table("t", vec![Column::int("id")]).unwrap();
        for i in 0..3 {
            db.insert("t", vec![Value::Int(i)]).unwrap();
        }
    }

    // First recovery replays and truncates; crash again immediately after.
    {
        let db = Database::open(config.clone()).unwrap();
        assert_eq!(db.select("t", None).unwrap().len(), 3);
    }

    // Second recovery sees an empty log and the flushed pages.
    let db = Database::open(config).unwrap();
    assert_eq!(db.select("t", None).unwrap().len(), 3);
}

#[test]
fn checkpoint_truncates_log_without_losing_rows() {
    let dir = tempdir().unwrap();
    let config = crash_prone_config(dir.path());
    let log_path = dir.path().join("db/db.log");

    let db = Database::open(config.clone()).unwrap();
    db.create_table("t", vec![Column::int("id")]).unwrap();
    db.insert("t", vec![Value::Int(1)]).unwrap();
    assert!(!std::fs::read_to_string(&log_path).unwrap().is_empty());

    db.checkpoint().unwrap();
    assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "");
    drop(db);

    let db = Database::open(config).unwrap();
    assert_eq!(db.select("t", None).unwrap(), vec![vec![Value::Int(1)]]);
}

#[test]
fn recovery_referencing_missing_table_aborts_open() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("db");
    std::fs::create_dir_all(&base).unwrap();
    // A log entry for a table the catalog does not know.
    std::fs::write(base.join("db.log"), "1|INSERT|ghost|0|0100000001\n").unwrap();

    let err = Database::open(crash_prone_config(dir.path())).unwrap_err();
    assert!(err.to_string().contains("missing during recovery"));
}
