mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stepwise::context::BuildContext;
use stepwise::dag::{Step, StepGraph, StepState};
use stepwise::errors::BuildError;
use stepwise::exec::{sync_func, Command, FunctionCommand};
use stepwise::hash::hash_bytes;
use stepwise::store::HashStore;
use stepwise::types::{DigestAlgorithm, NewFilePolicy};
use stepwise_test_utils::commands::{
    call_log, calls, failing_step, recording_command, recording_step, CallLog,
};
use stepwise_test_utils::init_tracing;
use stepwise_test_utils::store::FailingStore;
use tokio_util::sync::CancellationToken;

use common::{ctx_with_store, mock_ctx};

fn digest(content: &str) -> stepwise::hash::Digest {
    hash_bytes(DigestAlgorithm::Blake3, content.as_bytes())
}

fn watching(name: &str, log: &CallLog, pattern: &str) -> Step {
    recording_step(name, log).set_file_deps([pattern])
}

#[tokio::test]
async fn step_without_file_deps_runs_every_time() {
    init_tracing();
    let (_fs, _store, ctx) = mock_ctx();
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(recording_step("a", &log)).unwrap();

    let cancel = CancellationToken::new();
    g.run(&ctx, a, &cancel).await.unwrap();
    g.run(&ctx, a, &cancel).await.unwrap();
    g.reset();
    g.run(&ctx, a, &cancel).await.unwrap();

    assert_eq!(calls(&log), ["a", "a", "a"]);
    assert!(g.is_done(a));
}

#[tokio::test]
async fn first_observation_records_baseline_without_running() {
    init_tracing();
    let (fs, store, ctx) = mock_ctx();
    fs.add_file("/proj/f.txt", "x");
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(watching("a", &log, "/proj/f.txt")).unwrap();

    g.run(&ctx, a, &CancellationToken::new()).await.unwrap();

    assert!(calls(&log).is_empty());
    assert!(g.is_done(a));
    assert_eq!(store.get("/proj/f.txt").unwrap(), Some(digest("x")));
}

#[tokio::test]
async fn unchanged_files_skip_the_step() {
    let (fs, _store, ctx) = mock_ctx();
    fs.add_file("/proj/f.txt", "x");
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(watching("a", &log, "/proj/*.txt")).unwrap();
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        g.reset();
        g.run(&ctx, a, &cancel).await.unwrap();
        assert_eq!(g.state(a), Some(StepState::Done));
    }
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn changed_file_runs_all_commands_in_order_then_records_digest() {
    let (fs, store, ctx) = mock_ctx();
    fs.add_file("/proj/a.txt", "a");
    fs.add_file("/proj/b.txt", "b");
    let log = call_log();

    let step = Step::new(
        "build",
        vec![recording_command(&log, "one"), recording_command(&log, "two")],
    )
    .unwrap()
    .set_file_deps(["/proj/*.txt"]);

    let mut g = StepGraph::new();
    let id = g.add_step(step).unwrap();
    let cancel = CancellationToken::new();

    g.run(&ctx, id, &cancel).await.unwrap();
    assert!(calls(&log).is_empty());

    fs.add_file("/proj/b.txt", "b2");
    g.reset();
    g.run(&ctx, id, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["one", "two"]);
    assert_eq!(store.get("/proj/b.txt").unwrap(), Some(digest("b2")));
    assert_eq!(store.get("/proj/a.txt").unwrap(), Some(digest("a")));

    g.reset();
    g.run(&ctx, id, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["one", "two"]);
}

#[tokio::test]
async fn failed_commands_leave_the_cache_untouched_so_retry_reruns() {
    let (fs, store, ctx) = mock_ctx();
    fs.add_file("/proj/f.txt", "x");

    let broken = Arc::new(AtomicBool::new(true));
    let flaky: Command = {
        let broken = broken.clone();
        FunctionCommand::new(vec![sync_func(move || {
            if broken.load(Ordering::SeqCst) {
                anyhow::bail!("still broken");
            }
            Ok(())
        })])
        .unwrap()
        .into()
    };
    let log = call_log();
    let step = Step::new("a", vec![recording_command(&log, "before"), flaky])
        .unwrap()
        .set_file_deps(["/proj/f.txt"]);

    let mut g = StepGraph::new();
    let a = g.add_step(step).unwrap();
    let cancel = CancellationToken::new();

    g.run(&ctx, a, &cancel).await.unwrap();
    fs.add_file("/proj/f.txt", "y");
    g.reset();

    let err = g.run(&ctx, a, &cancel).await.unwrap_err();
    assert!(matches!(err, BuildError::Function { index: 0, .. }));
    assert_eq!(g.state(a), Some(StepState::Failed));
    assert_eq!(store.get("/proj/f.txt").unwrap(), Some(digest("x")));

    broken.store(false, Ordering::SeqCst);
    g.run(&ctx, a, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["before", "before"]);
    assert_eq!(store.get("/proj/f.txt").unwrap(), Some(digest("y")));
    assert!(g.is_done(a));
}

#[tokio::test]
async fn shared_dependency_runs_once_per_run_cycle() {
    let (_fs, _store, ctx) = mock_ctx();
    let log = call_log();

    let mut g = StepGraph::new();
    let base = g.add_step(recording_step("base", &log)).unwrap();
    let left = g.add_step(recording_step("left", &log).depends_on([base])).unwrap();
    let right = g.add_step(recording_step("right", &log).depends_on([base])).unwrap();
    let top = g
        .add_step(recording_step("top", &log).depends_on([left, right]))
        .unwrap();

    let cancel = CancellationToken::new();
    g.run(&ctx, top, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["base", "left", "right", "top"]);

    // A second target in the same cycle reuses finished dependencies.
    let extra = g.add_step(recording_step("extra", &log).depends_on([base, left])).unwrap();
    g.run(&ctx, extra, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["base", "left", "right", "top", "extra"]);
}

#[tokio::test]
async fn dependency_failure_short_circuits_dependent() {
    let (_fs, _store, ctx) = mock_ctx();
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(failing_step("a")).unwrap();
    let b = g.add_step(recording_step("b", &log).depends_on([a])).unwrap();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let err = g.run(&ctx, b, &cancel).await.unwrap_err();
        match err {
            BuildError::Function { source, .. } => {
                assert_eq!(source.to_string(), "a failed");
            }
            other => panic!("expected function error, got {other:?}"),
        }
        assert_eq!(g.state(a), Some(StepState::Failed));
        assert!(!g.is_done(b));
    }
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn persist_failure_is_reported_after_successful_commands() {
    let store = Arc::new(FailingStore::new());
    let (fs, ctx) = ctx_with_store(store.clone());
    fs.add_file("/proj/f.txt", "x");
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(watching("a", &log, "/proj/f.txt")).unwrap();
    let cancel = CancellationToken::new();
    g.run(&ctx, a, &cancel).await.unwrap();

    fs.add_file("/proj/f.txt", "y");
    store.fail_writes(true);
    g.reset();

    let err = g.run(&ctx, a, &cancel).await.unwrap_err();
    match err {
        BuildError::Persist { path, .. } => assert_eq!(path, "/proj/f.txt"),
        other => panic!("expected persist error, got {other:?}"),
    }
    assert_eq!(calls(&log), ["a"]);
    assert!(g.is_done(a));
    assert_eq!(store.get("/proj/f.txt").unwrap(), Some(digest("x")));
}

#[tokio::test]
async fn persist_failure_stops_the_remaining_writes() {
    let store = Arc::new(FailingStore::new());
    let (fs, ctx) = ctx_with_store(store.clone());
    for name in ["a", "b", "c"] {
        fs.add_file(format!("/proj/{name}.txt"), "old");
    }
    let log = call_log();

    let mut g = StepGraph::new();
    let step = g.add_step(watching("step", &log, "/proj/*.txt")).unwrap();
    let cancel = CancellationToken::new();
    g.run(&ctx, step, &cancel).await.unwrap();

    for name in ["a", "b", "c"] {
        fs.add_file(format!("/proj/{name}.txt"), "new");
    }
    store.fail_after(1);
    g.reset();

    let err = g.run(&ctx, step, &cancel).await.unwrap_err();
    match err {
        BuildError::Persist { path, .. } => assert_eq!(path, "/proj/b.txt"),
        other => panic!("expected persist error, got {other:?}"),
    }
    assert_eq!(calls(&log), ["step"]);
    assert!(g.is_done(step));
    assert_eq!(store.get("/proj/a.txt").unwrap(), Some(digest("new")));
    assert_eq!(store.get("/proj/b.txt").unwrap(), Some(digest("old")));
    assert_eq!(store.get("/proj/c.txt").unwrap(), Some(digest("old")));
}

#[tokio::test]
async fn baseline_write_failure_fails_the_check() {
    let store = Arc::new(FailingStore::new());
    store.fail_writes(true);
    let (fs, ctx) = ctx_with_store(store.clone());
    fs.add_file("/proj/f.txt", "x");
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(watching("a", &log, "/proj/f.txt")).unwrap();

    let err = g.run(&ctx, a, &CancellationToken::new()).await.unwrap_err();
    match err {
        BuildError::Io { path, .. } => assert_eq!(path, std::path::Path::new("/proj/f.txt")),
        other => panic!("expected the store's io error, got {other:?}"),
    }
    assert_eq!(g.state(a), Some(StepState::Failed));
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn rebuild_policy_runs_on_first_observation() {
    let (fs, store, ctx) = mock_ctx();
    let ctx = ctx.with_new_file_policy(NewFilePolicy::Rebuild);
    fs.add_file("/proj/f.txt", "x");
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(watching("a", &log, "/proj/f.txt")).unwrap();
    let cancel = CancellationToken::new();

    g.run(&ctx, a, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["a"]);
    assert_eq!(store.get("/proj/f.txt").unwrap(), Some(digest("x")));

    g.reset();
    g.run(&ctx, a, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["a"]);
}

#[tokio::test]
async fn switching_digest_algorithm_reruns_once() {
    let (fs, store, blake_ctx) = mock_ctx();
    fs.add_file("/proj/f.txt", "x");
    let sha_ctx = BuildContext::with_parts(
        store.clone(),
        Arc::new(fs.clone()),
        DigestAlgorithm::Sha256,
    );
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(watching("a", &log, "/proj/f.txt")).unwrap();
    let cancel = CancellationToken::new();

    g.run(&blake_ctx, a, &cancel).await.unwrap();
    assert!(calls(&log).is_empty());

    g.reset();
    g.run(&sha_ctx, a, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["a"]);
    assert_eq!(
        store.get("/proj/f.txt").unwrap(),
        Some(hash_bytes(DigestAlgorithm::Sha256, b"x"))
    );

    g.reset();
    g.run(&sha_ctx, a, &cancel).await.unwrap();
    assert_eq!(calls(&log), ["a"]);
}

#[tokio::test]
async fn pattern_matching_nothing_skips() {
    let (_fs, _store, ctx) = mock_ctx();
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(watching("a", &log, "/proj/*.none")).unwrap();

    g.run(&ctx, a, &CancellationToken::new()).await.unwrap();
    assert!(calls(&log).is_empty());
    assert!(g.is_done(a));
}

#[tokio::test]
async fn unreadable_file_fails_the_step() {
    let (fs, _store, ctx) = mock_ctx();
    fs.add_broken_file("/proj/f.txt", "par");
    let log = call_log();

    let mut g = StepGraph::new();
    let a = g.add_step(watching("a", &log, "/proj/f.txt")).unwrap();

    let err = g.run(&ctx, a, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, BuildError::Io { .. }));
    assert_eq!(g.state(a), Some(StepState::Failed));
    assert!(calls(&log).is_empty());
}
