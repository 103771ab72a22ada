// src/lib.rs

pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod spec;
pub mod tree;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::batch::planner::Selection;
use crate::cache::StageCache;
use crate::cli::CliArgs;
use crate::pipeline::StageRegistry;

/// High-level entry point used by `main.rs` and by embedding applications.
///
/// This wires together:
/// - task tree resolution
/// - the cache session (non-persistent for `--oneshot`)
/// - planning (printed as-is for dry runs)
/// - the batch runner with Ctrl-C handling
///
/// Returns `true` when everything that was attempted succeeded.
pub async fn run(args: CliArgs, registry: &StageRegistry) -> Result<bool> {
    let tree = tree::resolver::resolve(Path::new(&args.path))?;
    for failure in tree.errors() {
        warn!(
            task = %failure.path.display(),
            error = %failure.error,
            "subtree excluded from this batch"
        );
    }

    let selection = Selection::new(&args.task, &args.task_dir)?;
    let cache = Arc::new(StageCache::open(!args.oneshot));

    let plan = batch::planner::plan(&tree, registry, &cache, &selection, args.force, args.oneshot);

    if !args.run {
        print!("{}", plan.describe());
        println!("DRY RUN: use \"--run\" to run the tasks instead");
        return Ok(tree.errors().is_empty() && plan.errors.is_empty());
    }

    info!(
        pending = plan.pending_count(),
        satisfied = plan.skipped_count(),
        "starting batch run"
    );

    // Ctrl-C stops the run at the next item boundary; recorded stage
    // results stay valid, so a re-run resumes where this one stopped.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight items");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let report = batch::runner::run(
        &plan,
        &tree,
        registry,
        Arc::clone(&cache),
        args.workers,
        cancel,
    )
    .await?;

    print!("{}", report.describe());

    let ok = report.all_ok() && tree.errors().is_empty() && plan.errors.is_empty();
    Ok(ok)
}
