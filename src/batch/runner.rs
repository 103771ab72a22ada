// src/batch/runner.rs

//! Executes an [`ExecutionPlan`].
//!
//! Items run on a bounded worker pool. Tasks whose ancestor is also part of
//! the plan wait until that ancestor has finished, so derived work always
//! sees the ancestor's freshly recorded results; independent subtrees run
//! in parallel. A failed item is reported and never stops the rest of the
//! batch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::batch::planner::{build_pipeline, ExecutionPlan, PlanItem, TaskPlan};
use crate::cache::StageCache;
use crate::errors::{PipetreeError, Result};
use crate::pipeline::{execute_item, ItemContext, Pipeline, StageRegistry};
use crate::spec::InputId;
use crate::tree::{Task, TaskTree};

#[derive(Debug, Clone)]
pub enum ItemStatus {
    Completed { fresh: usize, reused: usize },
    Skipped,
    Interrupted,
    Failed { stage: Option<String>, message: String },
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub task: PathBuf,
    pub input: InputId,
    pub status: ItemStatus,
}

/// Aggregated outcome of one batch run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Completed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Skipped | ItemStatus::Interrupted))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed { .. }))
    }

    pub fn all_ok(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| matches!(o.status, ItemStatus::Failed { .. } | ItemStatus::Interrupted))
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    /// Human-readable summary: counts plus one line per failure.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "{} completed, {} skipped, {} failed\n",
            self.completed(),
            self.skipped(),
            self.failed()
        );
        for outcome in &self.outcomes {
            if let ItemStatus::Failed { stage, message } = &outcome.status {
                let task = if outcome.task.as_os_str().is_empty() {
                    ".".to_string()
                } else {
                    outcome.task.display().to_string()
                };
                let stage = stage.as_deref().unwrap_or("?");
                out.push_str(&format!(
                    "failed: {task} input {} at stage '{stage}': {message}\n",
                    outcome.input
                ));
            }
        }
        out
    }
}

/// Everything one task's items need, owned so it can move into a worker.
struct TaskJob {
    task: Task,
    root_dir: PathBuf,
    chain: Vec<PathBuf>,
    pipeline: Pipeline,
    end_stage: usize,
    force: bool,
    items: Vec<PlanItem>,
}

/// Execute the pending entries of `plan`.
///
/// `workers` bounds how many items are processed concurrently across the
/// whole batch. Setting `cancel` stops the run at the next item boundary;
/// already recorded stage results remain valid for the next invocation.
pub async fn run(
    plan: &ExecutionPlan,
    tree: &TaskTree,
    registry: &StageRegistry,
    cache: Arc<StageCache>,
    workers: usize,
    cancel: Arc<AtomicBool>,
) -> Result<RunReport> {
    let mut report = RunReport::default();

    // Completion gates for ancestor-before-descendant ordering.
    let mut gates: HashMap<PathBuf, (watch::Sender<bool>, watch::Receiver<bool>)> = HashMap::new();
    for task_plan in &plan.tasks {
        if task_plan.pending_items().next().is_some() {
            gates.insert(task_plan.task.clone(), watch::channel(false));
        }
    }

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set: JoinSet<Vec<ItemOutcome>> = JoinSet::new();
    let total = gates.len();
    let mut spawned = 0usize;

    for task_plan in &plan.tasks {
        // Items already satisfied go straight to the report.
        for item in &task_plan.items {
            if !item.is_pending() {
                report.outcomes.push(ItemOutcome {
                    task: task_plan.task.clone(),
                    input: item.input.clone(),
                    status: ItemStatus::Skipped,
                });
            }
        }

        let Some((gate_tx, _)) = gates.get(&task_plan.task) else {
            continue;
        };
        let gate_tx = gate_tx.clone();

        let job = match prepare_job(tree, registry, plan, task_plan) {
            Ok(job) => job,
            Err(error) => {
                // Keep the rest of the batch going, but open the gate so
                // descendants are not stuck waiting on this task.
                warn!(task = %task_plan.task.display(), %error, "task cannot be prepared");
                let _ = gate_tx.send(true);
                for item in task_plan.items.iter().filter(|i| i.is_pending()) {
                    report.outcomes.push(ItemOutcome {
                        task: task_plan.task.clone(),
                        input: item.input.clone(),
                        status: ItemStatus::Failed {
                            stage: None,
                            message: error.to_string(),
                        },
                    });
                }
                continue;
            }
        };
        let ancestor_gates: Vec<watch::Receiver<bool>> = tree
            .ancestors(&job.task)
            .iter()
            .filter_map(|ancestor| gates.get(&ancestor.path).map(|(_, rx)| rx.clone()))
            .collect();

        spawned += 1;
        let step = spawned;
        let cache = Arc::clone(&cache);
        let semaphore = Arc::clone(&semaphore);
        let cancel = Arc::clone(&cancel);

        set.spawn(async move {
            run_task_job(job, ancestor_gates, gate_tx, cache, semaphore, cancel, step, total).await
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcomes) => report.outcomes.extend(outcomes),
            Err(err) => return Err(PipetreeError::Other(err.into())),
        }
    }

    Ok(report)
}

fn prepare_job(
    tree: &TaskTree,
    registry: &StageRegistry,
    plan: &ExecutionPlan,
    task_plan: &TaskPlan,
) -> Result<TaskJob> {
    let task = tree
        .get(&task_plan.task)
        .ok_or_else(|| {
            PipetreeError::InvalidTree(format!(
                "planned task '{}' missing from tree",
                task_plan.task.display()
            ))
        })?
        .clone();

    let pipeline = build_pipeline(registry, &task)?;
    let chain = tree.cache_chain(&task);

    Ok(TaskJob {
        root_dir: tree.root_dir().to_path_buf(),
        chain,
        pipeline,
        end_stage: task_plan.end_stage,
        force: plan.force,
        items: task_plan.items.clone(),
        task,
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_task_job(
    job: TaskJob,
    ancestor_gates: Vec<watch::Receiver<bool>>,
    gate_tx: watch::Sender<bool>,
    cache: Arc<StageCache>,
    semaphore: Arc<Semaphore>,
    cancel: Arc<AtomicBool>,
    step: usize,
    total: usize,
) -> Vec<ItemOutcome> {
    for mut rx in ancestor_gates {
        // An ancestor that finishes (or fails) opens its gate either way.
        let _ = rx.wait_for(|done| *done).await;
    }

    info!(
        task = %job.task.label(),
        step,
        total,
        "entering task"
    );

    let job = Arc::new(job);
    let mut set: JoinSet<ItemOutcome> = JoinSet::new();

    for item in job.items.iter().filter(|item| item.is_pending()) {
        let input = item.input.clone();
        let job = Arc::clone(&job);
        let cache = Arc::clone(&cache);
        let semaphore = Arc::clone(&semaphore);
        let cancel = Arc::clone(&cancel);

        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();

            if cancel.load(Ordering::Relaxed) {
                return ItemOutcome {
                    task: job.task.path.clone(),
                    input,
                    status: ItemStatus::Interrupted,
                };
            }

            let ctx = ItemContext {
                task: &job.task,
                root_dir: &job.root_dir,
                chain: &job.chain,
                pipeline: &job.pipeline,
                end_stage: job.end_stage,
                force: job.force,
            };

            let status = match execute_item(&ctx, &input, &cache).await {
                Ok(timings) => ItemStatus::Completed {
                    fresh: timings.iter().filter(|t| !t.cached).count(),
                    reused: timings.iter().filter(|t| t.cached).count(),
                },
                Err(PipetreeError::StageFailure { stage, source }) => {
                    warn!(
                        task = %job.task.label(),
                        %input,
                        stage = %stage,
                        "item failed"
                    );
                    ItemStatus::Failed {
                        stage: Some(stage),
                        message: source.to_string(),
                    }
                }
                Err(err) => ItemStatus::Failed {
                    stage: None,
                    message: err.to_string(),
                },
            };

            ItemOutcome {
                task: job.task.path.clone(),
                input,
                status,
            }
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => warn!(%err, task = %job.task.label(), "item worker panicked"),
        }
    }

    let all_completed = outcomes
        .iter()
        .all(|o| matches!(o.status, ItemStatus::Completed { .. }));
    if all_completed && !outcomes.is_empty() {
        if let Err(err) = cache.write_digest(&job.task.dir, &job.task.spec.digest()) {
            warn!(task = %job.task.label(), %err, "could not record completion digest");
        }
    }

    // Open the gate for descendants whatever the outcome was.
    let _ = gate_tx.send(true);
    outcomes
}
