#![allow(dead_code)]

//! Small wrappers that drive the public engine API end to end.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use pipetree::batch::{self, ExecutionPlan, RunReport, Selection};
use pipetree::cache::StageCache;
use pipetree::pipeline::StageRegistry;
use pipetree::tree::resolver;

/// Resolve `root` and compute an unrestricted plan.
pub fn plan_batch(root: &Path, registry: &StageRegistry, force: bool) -> ExecutionPlan {
    let tree = resolver::resolve(root).expect("resolving task tree");
    let cache = StageCache::open(true);
    batch::plan(&tree, registry, &cache, &Selection::all(), force, false)
}

/// Resolve `root`, plan, and run everything that is pending.
pub async fn run_batch(
    root: &Path,
    registry: &StageRegistry,
    force: bool,
    oneshot: bool,
) -> RunReport {
    run_batch_selected(root, registry, force, oneshot, &Selection::all()).await
}

pub async fn run_batch_selected(
    root: &Path,
    registry: &StageRegistry,
    force: bool,
    oneshot: bool,
    selection: &Selection,
) -> RunReport {
    let tree = resolver::resolve(root).expect("resolving task tree");
    let cache = Arc::new(StageCache::open(!oneshot));
    let plan = batch::plan(&tree, registry, &cache, selection, force, oneshot);
    batch::run(
        &plan,
        &tree,
        registry,
        cache,
        4,
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .expect("running batch")
}
