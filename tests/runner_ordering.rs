// tests/runner_ordering.rs

//! Ancestor-before-descendant scheduling and in-run result sharing.

use pipetree::batch::Selection;
use pipetree_test_utils::builders::{SpecBuilder, TreeBuilder};
use pipetree_test_utils::harness::{run_batch, run_batch_selected};
use pipetree_test_utils::stages::{log_entries, new_log, seg_measure_registry};
use pipetree_test_utils::{init_tracing, with_timeout};
use serde_json::json;
use std::collections::BTreeSet;

#[tokio::test]
async fn descendant_reuses_ancestor_results_computed_in_the_same_run() {
    init_tracing();

    // Parent and derived child are both pending in the same run and share
    // the same effective configuration, so every fingerprint the child
    // needs is recorded by the parent first.
    let tree = TreeBuilder::new()
        .task(
            "",
            SpecBuilder::new()
                .runnable(true)
                .inputs(json!([1, 2]))
                .pipeline(&["seg", "measure"])
                .config("seg/threshold", json!(5)),
        )
        .task("derived", SpecBuilder::new());

    let log = new_log();
    let registry = seg_measure_registry(&log);

    let report = with_timeout(run_batch(tree.root(), &registry, false, false)).await;
    assert_eq!(report.completed(), 4);
    assert_eq!(report.failed(), 0);

    // Each (stage, input) pair was computed exactly once across both tasks.
    let entries = log_entries(&log);
    let unique: BTreeSet<&String> = entries.iter().collect();
    assert_eq!(entries.len(), 4);
    assert_eq!(unique.len(), 4);
}

#[tokio::test]
async fn unrelated_tasks_also_compute_each_fingerprint_once_per_run() {
    init_tracing();

    // Two sibling tasks with identical configurations do not share an
    // ancestor chain, but a batch run still computes each fingerprint once.
    let tree = TreeBuilder::new()
        .task("", SpecBuilder::new().config("seg/threshold", json!(5)))
        .task(
            "a",
            SpecBuilder::new()
                .runnable(true)
                .inputs(json!([1]))
                .pipeline(&["seg", "measure"]),
        )
        .task(
            "b",
            SpecBuilder::new()
                .runnable(true)
                .inputs(json!([1]))
                .pipeline(&["seg", "measure"]),
        );

    let log = new_log();
    let registry = seg_measure_registry(&log);

    let report = with_timeout(run_batch(tree.root(), &registry, false, false)).await;
    assert_eq!(report.completed(), 2);

    let entries = log_entries(&log);
    let unique: BTreeSet<&String> = entries.iter().collect();
    assert_eq!(unique.len(), entries.len(), "duplicate computation: {entries:?}");
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn selection_restricts_the_batch() {
    init_tracing();

    let runnable = || {
        SpecBuilder::new()
            .runnable(true)
            .inputs(json!([1]))
            .pipeline(&["seg", "measure"])
    };
    let tree = TreeBuilder::new()
        .task("", SpecBuilder::new().config("seg/threshold", json!(5)))
        .task("sweep/a", runnable())
        .task("sweep/b", runnable().config("seg/threshold", json!(6)))
        .task("other", runnable().config("seg/threshold", json!(7)));

    let log = new_log();
    let registry = seg_measure_registry(&log);

    // Exact --task selection.
    let selection = Selection::new(&["sweep/a".to_string()], &[]).unwrap();
    let report =
        with_timeout(run_batch_selected(tree.root(), &registry, false, false, &selection)).await;
    assert_eq!(report.completed(), 1);

    // --task-dir selects the subtree.
    let selection = Selection::new(&[], &["sweep".to_string()]).unwrap();
    let report =
        with_timeout(run_batch_selected(tree.root(), &registry, false, false, &selection)).await;
    assert_eq!(report.completed(), 1); // "a" already satisfied, "b" runs
    assert_eq!(report.skipped(), 1);

    // "other" was never touched.
    let selection = Selection::new(&[], &[]).unwrap();
    let report =
        with_timeout(run_batch_selected(tree.root(), &registry, false, false, &selection)).await;
    assert_eq!(report.completed(), 1);
}
