// src/batch/planner.rs

//! Computes what a batch invocation would do.
//!
//! For every selected, runnable task and each of its inputs the planner
//! walks the pipeline's fingerprints against the cache and finds the first
//! stage that is not already satisfied. That stage is the resumption point;
//! items without one are already complete and are skipped unless the run is
//! forced.

use std::path::PathBuf;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::cache::{stage_fingerprint, CacheEntry, StageCache, UpstreamState};
use crate::errors::{PipetreeError, Result};
use crate::pipeline::{Pipeline, StageRegistry};
use crate::spec::InputId;
use crate::tree::{Task, TaskTree};

/// Which tasks a batch invocation is restricted to.
///
/// An empty selection means every runnable task in the tree. `tasks` match
/// a single task directory exactly; `task_dirs` select a task together with
/// all tasks below it, and may be glob patterns.
#[derive(Debug)]
pub struct Selection {
    tasks: Vec<PathBuf>,
    dirs: GlobSet,
    restricted: bool,
}

impl Selection {
    pub fn all() -> Self {
        Self {
            tasks: Vec::new(),
            dirs: GlobSet::empty(),
            restricted: false,
        }
    }

    pub fn new(tasks: &[String], task_dirs: &[String]) -> Result<Self> {
        if tasks.is_empty() && task_dirs.is_empty() {
            return Ok(Self::all());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in task_dirs {
            let glob = Glob::new(normalize(pattern).to_string_lossy().as_ref())
                .with_context(|| format!("invalid --task-dir pattern '{pattern}'"))?;
            builder.add(glob);
        }

        Ok(Self {
            tasks: tasks.iter().map(|t| normalize(t)).collect(),
            dirs: builder.build().map_err(anyhow::Error::from)?,
            restricted: true,
        })
    }

    /// Whether `task` falls under this selection.
    pub fn matches(&self, task: &Task) -> bool {
        if !self.restricted {
            return true;
        }
        if self.tasks.iter().any(|t| *t == task.path) {
            return true;
        }
        // A task is selected by `--task-dir` when the pattern matches the
        // task itself or any of its ancestor directories.
        task.path
            .ancestors()
            .any(|prefix| !prefix.as_os_str().is_empty() && self.dirs.is_match(prefix))
    }
}

fn normalize(path: &str) -> PathBuf {
    let trimmed = path.trim().trim_start_matches("./").trim_end_matches('/');
    if trimmed == "." {
        PathBuf::new()
    } else {
        PathBuf::from(trimmed)
    }
}

/// How one planned item will be treated by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Work remains; execution resumes at `first_stage`.
    Pending,
    /// Every stage is satisfied by recorded results.
    Skipped,
    /// `--force`: all stages treated as pending regardless of the cache.
    Forced,
}

/// One `(task, input, resumption point)` plan entry.
#[derive(Debug, Clone)]
pub struct PlanItem {
    pub input: InputId,
    /// Index of the first stage that has to run, `None` when satisfied.
    pub first_stage: Option<usize>,
    pub disposition: Disposition,
}

impl PlanItem {
    pub fn is_pending(&self) -> bool {
        !matches!(self.disposition, Disposition::Skipped)
    }
}

/// The planned work of one task.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    /// Task path relative to the tree root.
    pub task: PathBuf,
    /// Stage identifiers in execution order (for display).
    pub stage_ids: Vec<String>,
    /// Index of the last stage in scope (`last_stage` applied).
    pub end_stage: usize,
    /// The task previously completed with exactly this specification.
    pub completed_before: bool,
    pub items: Vec<PlanItem>,
}

impl TaskPlan {
    pub fn pending_items(&self) -> impl Iterator<Item = &PlanItem> {
        self.items.iter().filter(|item| item.is_pending())
    }
}

/// A task that could not be planned; the rest of the plan is unaffected.
#[derive(Debug)]
pub struct PlanError {
    pub task: PathBuf,
    pub error: PipetreeError,
}

/// The ordered work of one batch invocation. Task order follows the tree,
/// so every ancestor precedes its descendants.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub tasks: Vec<TaskPlan>,
    pub errors: Vec<PlanError>,
    pub force: bool,
    pub oneshot: bool,
}

impl ExecutionPlan {
    pub fn pending_count(&self) -> usize {
        self.tasks.iter().map(|t| t.pending_items().count()).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.tasks
            .iter()
            .flat_map(|t| &t.items)
            .filter(|i| i.disposition == Disposition::Skipped)
            .count()
    }

    pub fn is_fully_skipped(&self) -> bool {
        self.pending_count() == 0
    }

    /// Human-readable plan summary for dry runs.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let push = |out: &mut String, line: String| {
            out.push_str(&line);
            out.push('\n');
        };

        push(&mut out, format!("{} task(s) selected", self.tasks.len()));
        if self.force {
            push(&mut out, "  force: recorded results are ignored".to_string());
        }
        if self.oneshot {
            push(&mut out, "  oneshot: completion will not be persisted".to_string());
        }

        for task in &self.tasks {
            let label = if task.task.as_os_str().is_empty() {
                ".".to_string()
            } else {
                task.task.display().to_string()
            };
            push(&mut out, format!("- {label}"));
            push(
                &mut out,
                format!("    pipeline: {}", task.stage_ids[..=task.end_stage].join(" -> ")),
            );
            if task.completed_before {
                push(&mut out, "    previously completed".to_string());
            }
            for item in &task.items {
                let line = match (item.disposition, item.first_stage) {
                    (Disposition::Skipped, _) => {
                        format!("    input {}: satisfied", item.input)
                    }
                    (Disposition::Forced, _) => {
                        format!("    input {}: forced from '{}'", item.input, task.stage_ids[0])
                    }
                    (Disposition::Pending, Some(idx)) => format!(
                        "    input {}: run from '{}'",
                        item.input, task.stage_ids[idx]
                    ),
                    (Disposition::Pending, None) => {
                        format!("    input {}: run", item.input)
                    }
                };
                push(&mut out, line);
            }
        }

        for err in &self.errors {
            push(
                &mut out,
                format!("! {}: {}", err.task.display(), err.error),
            );
        }

        push(
            &mut out,
            format!(
                "{} item(s) pending, {} satisfied",
                self.pending_count(),
                self.skipped_count()
            ),
        );
        out
    }
}

/// Compute the execution plan for `tree` under the given selection.
pub fn plan(
    tree: &TaskTree,
    registry: &StageRegistry,
    cache: &StageCache,
    selection: &Selection,
    force: bool,
    oneshot: bool,
) -> ExecutionPlan {
    let mut tasks = Vec::new();
    let mut errors = Vec::new();

    for task in tree.tasks() {
        if !task.runnable() || !selection.matches(task) {
            continue;
        }

        match plan_task(tree, registry, cache, task, force) {
            Ok(task_plan) => tasks.push(task_plan),
            Err(error) => errors.push(PlanError {
                task: task.path.clone(),
                error,
            }),
        }
    }

    ExecutionPlan {
        tasks,
        errors,
        force,
        oneshot,
    }
}

fn plan_task(
    tree: &TaskTree,
    registry: &StageRegistry,
    cache: &StageCache,
    task: &Task,
    force: bool,
) -> Result<TaskPlan> {
    let pipeline = build_pipeline(registry, task)?;
    let end_stage = pipeline
        .end_index(task.spec.last_stage.as_deref())
        .map_err(|err| PipetreeError::conflict(&task.dir, err.to_string()))?;

    let inputs = task.inputs()?;
    let chain = tree.cache_chain(task);
    let completed_before =
        crate::cache::store::read_digest(&task.dir).as_deref() == Some(task.spec.digest().as_str());

    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        let item = if force {
            PlanItem {
                input,
                first_stage: Some(0),
                disposition: Disposition::Forced,
            }
        } else {
            let first_stage = first_pending_stage(cache, &chain, task, &pipeline, end_stage, &input);
            PlanItem {
                disposition: match first_stage {
                    Some(_) => Disposition::Pending,
                    None => Disposition::Skipped,
                },
                input,
                first_stage,
            }
        };
        items.push(item);
    }

    debug!(
        task = %task.label(),
        pending = items.iter().filter(|i| i.is_pending()).count(),
        total = items.len(),
        "planned task"
    );

    Ok(TaskPlan {
        task: task.path.clone(),
        stage_ids: pipeline.stages().iter().map(|s| s.id().to_string()).collect(),
        end_stage,
        completed_before,
        items,
    })
}

pub(crate) fn build_pipeline(registry: &StageRegistry, task: &Task) -> Result<Pipeline> {
    let ids = match &task.spec.pipeline {
        Some(ids) if !ids.is_empty() => ids,
        _ => {
            return Err(PipetreeError::conflict(
                &task.dir,
                "runnable task declares no pipeline",
            ))
        }
    };
    registry
        .build_pipeline(ids)
        .map_err(|err| PipetreeError::conflict(&task.dir, err.to_string()))
}

/// Walk the item's fingerprints in stage order and return the index of the
/// first stage without a reusable recorded result.
fn first_pending_stage(
    cache: &StageCache,
    chain: &[PathBuf],
    task: &Task,
    pipeline: &Pipeline,
    end_stage: usize,
    input: &InputId,
) -> Option<usize> {
    let mut state = UpstreamState::for_input(input);

    for (idx, stage) in pipeline.stages()[..=end_stage].iter().enumerate() {
        let stage_config = task.spec.config.namespace(stage.id());
        let fp = stage_fingerprint(stage.as_ref(), &stage_config, &state);

        match cache.lookup(chain, &fp).filter(CacheEntry::is_reusable) {
            Some(_) => state.apply(stage.as_ref(), &fp),
            None => return Some(idx),
        }
    }
    None
}
