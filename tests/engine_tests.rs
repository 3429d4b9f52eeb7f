//! Engine pieces: dedup, no-clobber moves, the result ledger and retry set reconciliation.

use dropgrab::engine::{
    ProgressAggregator, Reconciled, ResultLedger, RetrySetHandle, find_existing,
    move_no_clobber, output_path_for, persist_failures, reconcile_retry_set,
};
use dropgrab::input::read_rows;
use dropgrab::{FailureReason, InputSchema, Outcome, Row, WorkItem, load_batch};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn item(key: &str) -> WorkItem {
    WorkItem {
        index: 0,
        key: key.to_string(),
        locator: format!("https://example.com/{key}"),
        row: Row::new([key, "x"]),
    }
}

fn keys(ks: &[&str]) -> HashSet<String> {
    ks.iter().map(|k| k.to_string()).collect()
}

// dedup

#[test]
fn test_find_existing_on_missing_dir_is_none() {
    let tmp = TempDir::new().unwrap();
    assert_eq!(find_existing(&tmp.path().join("nope"), "111"), None);
}

#[test]
fn test_find_existing_matches_stem_case_sensitively() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("ABC.jpeg"), b"x").unwrap();
    std::fs::write(tmp.path().join("1110.jpg"), b"x").unwrap();

    assert_eq!(
        find_existing(tmp.path(), "ABC"),
        Some(tmp.path().join("ABC.jpeg"))
    );
    assert_eq!(find_existing(tmp.path(), "abc"), None);
    assert_eq!(find_existing(tmp.path(), "111"), None);
}

#[test]
fn test_find_existing_ignores_directories() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("111")).unwrap();
    assert_eq!(find_existing(tmp.path(), "111"), None);
}

#[test]
fn test_extensionless_dotted_key_matches_full_name() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("A.B"), b"x").unwrap();
    assert_eq!(find_existing(tmp.path(), "A.B"), Some(tmp.path().join("A.B")));
}

#[test]
fn test_output_path_keeps_produced_extension() {
    let out = PathBuf::from("/out");
    assert_eq!(
        output_path_for(&out, "111", Some(OsStr::new("webp"))),
        PathBuf::from("/out/111.webp")
    );
    assert_eq!(output_path_for(&out, "111", None), PathBuf::from("/out/111"));
    assert_eq!(
        output_path_for(&out, "111", Some(OsStr::new(""))),
        PathBuf::from("/out/111")
    );
}

#[test]
fn test_move_no_clobber_refuses_existing_destination() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src.jpg");
    let dst = tmp.path().join("111.jpg");
    std::fs::write(&src, b"new").unwrap();
    std::fs::write(&dst, b"old").unwrap();

    let err = move_no_clobber(&src, &dst).unwrap_err();

    assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
    assert_eq!(std::fs::read(&dst).unwrap(), b"old");
    assert!(src.exists());
}

#[test]
fn test_move_no_clobber_moves_file() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src.jpg");
    let dst = tmp.path().join("111.jpg");
    std::fs::write(&src, b"new").unwrap();

    move_no_clobber(&src, &dst).unwrap();

    assert_eq!(std::fs::read(&dst).unwrap(), b"new");
    assert!(!src.exists());
}

// ledger

#[test]
fn test_ledger_tally_and_successful_keys() {
    let mut ledger = ResultLedger::new(3);
    ledger.record(&item("a"), &Outcome::Completed { path: "a.jpg".into() });
    ledger.record(&item("b"), &Outcome::Skipped { existing: "b.jpg".into() });
    ledger.record(
        &item("c"),
        &Outcome::Failed {
            reason: FailureReason::MissingOutput,
        },
    );

    let (tally, ok) = ledger.finalize().unwrap();
    assert_eq!((tally.completed, tally.skipped, tally.failed.len()), (1, 1, 1));
    assert_eq!(tally.failed[0].key, "c");
    assert_eq!(tally.failed[0].reason, "download failed - no file returned");
    assert_eq!(ok, keys(&["a", "b"]));
}

#[test]
fn test_ledger_finalize_rejects_unaccounted_items() {
    let mut ledger = ResultLedger::new(2);
    ledger.record(&item("a"), &Outcome::Completed { path: "a.jpg".into() });
    let err = ledger.finalize().unwrap_err();
    assert!(err.to_string().contains("ledger mismatch"));
}

fn batch_in(dir: &std::path::Path, name: &str, body: &str) -> dropgrab::InputBatch {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    load_batch(&path, &InputSchema::default()).unwrap()
}

#[test]
fn test_persist_without_failures_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let batch = batch_in(tmp.path(), "b.csv", "UPC,IMAGES_LINK\n1,u1\n");
    let tally = dropgrab::Tally {
        total: 1,
        completed: 1,
        ..Default::default()
    };

    assert_eq!(persist_failures(&tally, &batch).unwrap(), None);
    assert!(!tmp.path().join("b_retry.csv").exists());
}

#[test]
fn test_persist_writes_failed_rows_with_original_shape() {
    let tmp = TempDir::new().unwrap();
    let batch = batch_in(
        tmp.path(),
        "b.tsv",
        "Vendor\tUPC\tIMAGES_LINK\nAcme\t1\tu1\nGlobex\t2\tu2\n",
    );
    let mut ledger = ResultLedger::new(2);
    ledger.record(&batch.items[0], &Outcome::Completed { path: "1.jpg".into() });
    ledger.record(
        &batch.items[1],
        &Outcome::Failed {
            reason: FailureReason::Cancelled,
        },
    );
    let (tally, _) = ledger.finalize().unwrap();

    let handle = persist_failures(&tally, &batch).unwrap().unwrap();

    assert_eq!(handle.path, tmp.path().join("b_retry.tsv"));
    let (headers, rows) = read_rows(&handle.path, b'\t').unwrap();
    assert_eq!(headers, vec!["Vendor", "UPC", "IMAGES_LINK"]);
    assert_eq!(rows, vec![Row::new(["Globex", "2", "u2"])]);
}

fn retry_handle(dir: &std::path::Path, body: &str) -> RetrySetHandle {
    let path = dir.join("b_retry.csv");
    std::fs::write(&path, body).unwrap();
    RetrySetHandle {
        path,
        delimiter: b',',
        key_column: "UPC".to_string(),
    }
}

#[test]
fn test_reconcile_removes_only_succeeded_rows() {
    let tmp = TempDir::new().unwrap();
    let handle = retry_handle(tmp.path(), "UPC,IMAGES_LINK\n1,u1\n2,u2\n3,u3\n");

    let r = reconcile_retry_set(&handle, &keys(&["1", "3"])).unwrap();

    assert_eq!(r, Reconciled::Rewritten { remaining: 1 });
    let (_, rows) = read_rows(&handle.path, b',').unwrap();
    assert_eq!(rows, vec![Row::new(["2", "u2"])]);
}

#[test]
fn test_reconcile_deletes_when_everything_succeeded() {
    let tmp = TempDir::new().unwrap();
    let handle = retry_handle(tmp.path(), "UPC,IMAGES_LINK\n1,u1\n2,u2\n");

    let r = reconcile_retry_set(&handle, &keys(&["1", "2", "99"])).unwrap();

    assert_eq!(r, Reconciled::Deleted);
    assert!(!handle.exists());
}

#[test]
fn test_reconcile_with_no_success_leaves_file_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let body = "UPC,IMAGES_LINK\n1,u1\n";
    let handle = retry_handle(tmp.path(), body);

    let r = reconcile_retry_set(&handle, &HashSet::new()).unwrap();

    assert_eq!(r, Reconciled::Unchanged);
    assert_eq!(std::fs::read_to_string(&handle.path).unwrap(), body);
}

#[test]
fn test_reconcile_absent_artifact_is_noop() {
    let tmp = TempDir::new().unwrap();
    let handle = RetrySetHandle {
        path: tmp.path().join("none_retry.csv"),
        delimiter: b',',
        key_column: "UPC".to_string(),
    };

    assert_eq!(
        reconcile_retry_set(&handle, &keys(&["1"])).unwrap(),
        Reconciled::Unchanged
    );
    assert!(!handle.path.exists());
}

// progress

#[test]
fn test_progress_advance_is_never_lost_across_threads() {
    let progress = Arc::new(ProgressAggregator::hidden(400, 4));
    let handles: Vec<_> = (0..4)
        .map(|slot| {
            let p = Arc::clone(&progress);
            thread::spawn(move || {
                for i in 0..100 {
                    p.report(slot, &format!("k{i}"), "downloading");
                    p.advance(1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(progress.advanced(), progress.total());
    for slot in 0..4 {
        assert_eq!(progress.last_phase(slot).unwrap().phase, "downloading");
    }
    assert_eq!(progress.last_phase(9), None);
}
