//! Opening the archive file repeatedly and failing fast on hard errors
//!
//! Run with: cargo test --test connection_retry_test -- --nocapture

use std::time::{Duration, Instant};

use tempfile::TempDir;

use archiver_core::adapters::duckdb::DuckDbRepository;

/// Reopening the same file is routine: CLI runs, then the server
#[test]
fn test_sequential_connections() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_sequential.duckdb");

    for i in 0..5 {
        let start = Instant::now();
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
        println!("Connection {}: opened in {:?}", i, start.elapsed());
        assert_eq!(repo.db_path(), Some(db_path.as_path()));
    }
}

/// Migrations run once; later opens find nothing pending
#[test]
fn test_schema_applied_once() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("archive.duckdb");

    let first = DuckDbRepository::new(&db_path).unwrap().run_migrations().unwrap();
    assert!(!first.applied.is_empty());

    let second = DuckDbRepository::new(&db_path).unwrap().run_migrations().unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(second.already_applied, first.applied.len());
}

/// A missing parent directory is not a lock error and must not be retried
#[test]
fn test_hard_error_not_retried() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("no-such-dir").join("archive.duckdb");

    let start = Instant::now();
    let result = DuckDbRepository::new(&db_path);

    assert!(result.is_err());
    // Full backoff would sleep 50+100+200+400ms
    assert!(start.elapsed() < Duration::from_millis(700));
}
