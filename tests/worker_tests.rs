mod common;

use common::{Behavior, StubFetcher, leftover_scratch, opts};
use dropgrab::engine::ProgressAggregator;
use dropgrab::fetch::FetchError;
use dropgrab::pipeline::{ExecutionSlot, run_item};
use dropgrab::{FailureReason, Outcome, Row, WorkItem};
use tempfile::TempDir;

fn item(key: &str, locator: &str) -> WorkItem {
    WorkItem {
        index: 0,
        key: key.to_string(),
        locator: locator.to_string(),
        row: Row::new([key, locator]),
    }
}

struct Fixture {
    _tmp: TempDir,
    out: std::path::PathBuf,
    slot: ExecutionSlot,
    progress: ProgressAggregator,
    opts: dropgrab::BatchOpts,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    let opts = opts(&out, tmp.path(), 1);
    let slot = ExecutionSlot::open(0, &opts);
    Fixture {
        _tmp: tmp,
        out,
        slot,
        progress: ProgressAggregator::hidden(1, 1),
        opts,
    }
}

fn run(fx: &Fixture, it: &WorkItem, fetcher: &StubFetcher) -> Outcome {
    run_item(it, &fx.out, &fx.slot, fetcher, &fx.opts.launch, &fx.progress)
}

#[test]
fn test_existing_output_is_skipped_without_fetch() {
    let fx = fixture();
    std::fs::write(fx.out.join("111.png"), b"old").unwrap();
    let fetcher = StubFetcher::new().on("u1", Behavior::Produce("a.jpg"));

    let outcome = run(&fx, &item("111", "u1"), &fetcher);

    assert_eq!(
        outcome,
        Outcome::Skipped {
            existing: fx.out.join("111.png")
        }
    );
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(fetcher.launch_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_completed_item_is_renamed_to_key_and_scratch_removed() {
    let fx = fixture();
    let fetcher = StubFetcher::new().on("u1", Behavior::Produce("IMG_0042.JPG"));

    let outcome = run(&fx, &item("111", "u1"), &fetcher);

    let expected = fx.out.join("111.JPG");
    assert_eq!(outcome, Outcome::Completed { path: expected.clone() });
    assert_eq!(std::fs::read(&expected).unwrap(), b"u1");
    assert!(leftover_scratch(&fx.out).is_empty());
    let phase = fx.progress.last_phase(0).unwrap();
    assert_eq!(phase.key, "111");
    assert_eq!(phase.phase, "done");
}

#[test]
fn test_fetch_error_becomes_failed_outcome() {
    let fx = fixture();
    let fetcher = StubFetcher::new().on(
        "u1",
        Behavior::Fail(FetchError::PageLoadTimeout("u1".into())),
    );

    let outcome = run(&fx, &item("111", "u1"), &fetcher);

    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: FailureReason::Fetch(FetchError::PageLoadTimeout("u1".into()))
        }
    );
    assert!(leftover_scratch(&fx.out).is_empty());
    assert_eq!(std::fs::read_dir(&fx.out).unwrap().count(), 0);
}

#[test]
fn test_fetcher_returning_nothing_is_missing_output() {
    let fx = fixture();
    let fetcher = StubFetcher::new().on("u1", Behavior::NoFile);

    let outcome = run(&fx, &item("111", "u1"), &fetcher);

    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: FailureReason::MissingOutput
        }
    );
    assert!(leftover_scratch(&fx.out).is_empty());
}

#[test]
fn test_racing_duplicate_is_never_overwritten() {
    let fx = fixture();
    let fetcher = StubFetcher::new().on(
        "u1",
        Behavior::RaceThenProduce {
            output_dir: fx.out.clone(),
            key: "111",
            name: "mine.jpg",
        },
    );

    let outcome = run(&fx, &item("111", "u1"), &fetcher);

    assert!(matches!(
        outcome,
        Outcome::Failed {
            reason: FailureReason::Move { .. }
        }
    ));
    assert_eq!(std::fs::read(fx.out.join("111.png")).unwrap(), b"other slot");
    assert!(!fx.out.join("111.jpg").exists());
    assert!(leftover_scratch(&fx.out).is_empty());
}

#[test]
fn test_occupied_scratch_dir_fails_without_fetch() {
    let fx = fixture();
    let busy = fx.slot.scratch_dir_for("111");
    std::fs::create_dir_all(&busy).unwrap();
    let fetcher = StubFetcher::new().on("u1", Behavior::Produce("a.jpg"));

    let outcome = run(&fx, &item("111", "u1"), &fetcher);

    assert!(matches!(
        outcome,
        Outcome::Failed {
            reason: FailureReason::Scratch { .. }
        }
    ));
    assert_eq!(fetcher.call_count(), 0);
}

#[test]
fn test_slot_drop_clears_only_its_own_scratch() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    std::fs::create_dir_all(out.join(".tmp_1_other")).unwrap();
    let opts = opts(&out, tmp.path(), 2);

    let slot = ExecutionSlot::open(0, &opts);
    std::fs::create_dir_all(slot.scratch_dir_for("k")).unwrap();
    drop(slot);

    assert_eq!(leftover_scratch(&out), vec![".tmp_1_other".to_string()]);
}
