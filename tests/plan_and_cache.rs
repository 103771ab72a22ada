// tests/plan_and_cache.rs

//! Planning, recorded-result reuse, and resumption behavior.

use pipetree::batch::Disposition;
use pipetree_test_utils::builders::{SpecBuilder, TreeBuilder};
use pipetree_test_utils::harness::{plan_batch, run_batch};
use pipetree_test_utils::stages::{log_entries, new_log, seg_measure_registry, RecordingStage};
use pipetree_test_utils::{init_tracing, with_timeout};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn three_input_tree() -> TreeBuilder {
    TreeBuilder::new().task(
        "",
        SpecBuilder::new()
            .runnable(true)
            .inputs(json!([1, 2, 3]))
            .pipeline(&["seg", "measure"])
            .config("seg/threshold", json!(5)),
    )
}

#[tokio::test]
async fn second_plan_after_a_complete_run_is_fully_skipped() {
    init_tracing();

    let tree = three_input_tree();
    let log = new_log();
    let registry = seg_measure_registry(&log);

    let report = with_timeout(run_batch(tree.root(), &registry, false, false)).await;
    assert_eq!(report.completed(), 3);
    assert_eq!(report.failed(), 0);
    assert_eq!(log_entries(&log).len(), 6);

    let plan = plan_batch(tree.root(), &registry, false);
    assert!(plan.is_fully_skipped());
    assert_eq!(plan.skipped_count(), 3);

    // Running the empty plan computes nothing new.
    let report = with_timeout(run_batch(tree.root(), &registry, false, false)).await;
    assert_eq!(report.completed(), 0);
    assert_eq!(report.skipped(), 3);
    assert_eq!(log_entries(&log).len(), 6);
}

#[tokio::test]
async fn derived_task_is_satisfied_by_inherited_results() {
    init_tracing();

    let tree = three_input_tree();
    let log = new_log();
    let registry = seg_measure_registry(&log);

    // Complete the template first.
    with_timeout(run_batch(tree.root(), &registry, false, false)).await;

    // A derived task with an unchanged configuration appears afterwards.
    let tree = tree.task("derived", SpecBuilder::new());
    let plan = plan_batch(tree.root(), &registry, false);

    let derived = plan
        .tasks
        .iter()
        .find(|t| t.task == Path::new("derived"))
        .expect("derived task planned");
    assert!(derived.items.iter().all(|i| i.disposition == Disposition::Skipped));
    assert!(derived.items.iter().all(|i| i.first_stage.is_none()));
}

#[tokio::test]
async fn sibling_with_override_diverges_from_first_affected_stage() {
    init_tracing();

    let tree = three_input_tree();
    let log = new_log();
    let registry = seg_measure_registry(&log);
    with_timeout(run_batch(tree.root(), &registry, false, false)).await;

    let tree = tree
        .task(
            "thresh7",
            SpecBuilder::new().config("seg/threshold", json!(7)),
        )
        .task(
            "stats2",
            SpecBuilder::new().config("measure/bins", json!(2)),
        );

    let plan = plan_batch(tree.root(), &registry, false);
    let find = |name: &str| {
        plan.tasks
            .iter()
            .find(|t| t.task == Path::new(name))
            .unwrap()
    };

    // Changing the first stage's namespace invalidates the whole chain.
    let thresh7 = find("thresh7");
    assert!(thresh7.items.iter().all(|i| i.first_stage == Some(0)));

    // Changing only the second stage's namespace resumes there, reusing the
    // template's first-stage results through the ancestor chain.
    let stats2 = find("stats2");
    assert!(stats2.items.iter().all(|i| i.first_stage == Some(1)));
}

#[tokio::test]
async fn failed_item_is_isolated_and_resumes_at_the_failed_stage() {
    init_tracing();

    let tree = three_input_tree();

    // First attempt: `measure` breaks for input 2.
    let log = new_log();
    let registry = pipetree::pipeline::StageRegistry::new()
        .with(Arc::new(RecordingStage::new(
            "seg",
            &["input"],
            &["mask"],
            log.clone(),
        )))
        .with(Arc::new(
            RecordingStage::new("measure", &["mask"], &["stats"], log.clone())
                .failing_on(json!(2)),
        ));

    let report = with_timeout(run_batch(tree.root(), &registry, false, false)).await;
    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 1);

    // Second attempt with the repaired stage re-runs only `measure` for
    // input 2; everything else is satisfied by recorded results.
    let log = new_log();
    let registry = seg_measure_registry(&log);

    let plan = plan_batch(tree.root(), &registry, false);
    let items = &plan.tasks[0].items;
    let pending: Vec<_> = items.iter().filter(|i| i.is_pending()).collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].input.to_string(), "2");
    assert_eq!(pending[0].first_stage, Some(1));

    let report = with_timeout(run_batch(tree.root(), &registry, false, false)).await;
    assert_eq!(report.completed(), 1);
    assert_eq!(log_entries(&log), vec!["measure:2"]);
}

#[tokio::test]
async fn unknown_stages_are_a_planning_error_not_a_crash() {
    init_tracing();

    let tree = TreeBuilder::new().task(
        "",
        SpecBuilder::new()
            .runnable(true)
            .inputs(json!([1]))
            .pipeline(&["nonexistent"]),
    );

    let log = new_log();
    let registry = seg_measure_registry(&log);
    let plan = plan_batch(tree.root(), &registry, false);

    assert!(plan.tasks.is_empty());
    assert_eq!(plan.errors.len(), 1);
    assert!(plan.errors[0].error.to_string().contains("unknown stage"));
}
