// src/pipeline/executor.rs

//! Runs a pipeline against one input item.
//!
//! Before every stage the executor computes the stage's fingerprint and
//! consults the cache; a hit loads the recorded artifact instead of running
//! the stage. Fresh results are persisted and recorded immediately, so an
//! interrupted item resumes exactly at the stage that did not finish.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::store::write_json_atomic;
use crate::cache::{
    stage_fingerprint, CacheEntry, CacheStatus, StageCache, UpstreamState, CACHE_DIRNAME,
};
use crate::config::Config;
use crate::errors::{PipetreeError, Result};
use crate::paths;
use crate::pipeline::pipeline::Pipeline;
use crate::pipeline::stage::{PipelineData, Stage};
use crate::spec::InputId;
use crate::tree::Task;

/// Everything the executor needs to process the items of one task.
pub struct ItemContext<'a> {
    pub task: &'a Task,
    /// Absolute root directory of the task tree.
    pub root_dir: &'a Path,
    /// Cache lookup chain: own directory first, then ancestors.
    pub chain: &'a [PathBuf],
    pub pipeline: &'a Pipeline,
    /// Index of the last stage to execute.
    pub end_stage: usize,
    /// Ignore recorded results and recompute every stage.
    pub force: bool,
}

/// Per-stage outcome of one processed item.
#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: String,
    pub seconds: f64,
    pub cached: bool,
}

/// Process one input item, stage by stage.
///
/// Returns the per-stage timings on success. A stage failure is recorded in
/// the cache and reported as [`PipetreeError::StageFailure`]; it never
/// affects other items.
pub async fn execute_item(
    ctx: &ItemContext<'_>,
    input: &InputId,
    cache: &StageCache,
) -> Result<Vec<StageTiming>> {
    let mut data = PipelineData::new();
    data.insert("input".to_string(), serde_json::to_value(input)?);
    if let Some(pattern) = &ctx.task.spec.input_pathpattern {
        let input_path = paths::resolve_for_input(pattern, &ctx.task.dir, ctx.root_dir, input);
        data.insert(
            "input_path".to_string(),
            Value::String(input_path.to_string_lossy().into_owned()),
        );
    }

    let mut state = UpstreamState::for_input(input);
    let mut timings = Vec::new();

    for stage in &ctx.pipeline.stages()[..=ctx.end_stage] {
        let stage_config = ctx.task.spec.config.namespace(stage.id());
        let fp = stage_fingerprint(stage.as_ref(), &stage_config, &state);

        // At most one worker computes a given fingerprint; everyone else
        // blocks here and then sees the recorded entry.
        let _guard = cache.lock(&fp).await;

        // `force` ignores results recorded by earlier runs, but anything
        // computed during this very session is still reused (at most one
        // fresh computation per fingerprint per run).
        let recorded = if ctx.force {
            None
        } else {
            cache.lookup(ctx.chain, &fp).filter(CacheEntry::is_reusable)
        };
        let via_session = recorded.is_none();
        let reusable = recorded.or_else(|| cache.session_hit(&fp));

        if let Some(entry) = reusable {
            match load_artifact(&entry) {
                Ok(outputs) => {
                    if via_session {
                        // Make the reuse visible to future plans of this
                        // task, which only search its own ancestor chain.
                        cache.record(&ctx.task.dir, &fp, entry.clone())?;
                    }
                    debug!(
                        task = %ctx.task.label(),
                        %input,
                        stage = stage.id(),
                        fingerprint = %fp,
                        "reusing recorded stage result"
                    );
                    absorb_outputs(&mut data, stage.as_ref(), outputs);
                    state.apply(stage.as_ref(), &fp);
                    timings.push(StageTiming {
                        stage: stage.id().to_string(),
                        seconds: 0.0,
                        cached: true,
                    });
                    continue;
                }
                Err(err) => {
                    warn!(
                        stage = stage.id(),
                        fingerprint = %fp,
                        %err,
                        "recorded artifact unreadable; recomputing"
                    );
                    cache.invalidate(&ctx.task.dir, &fp)?;
                }
            }
        }

        cache.record(&ctx.task.dir, &fp, CacheEntry::new(CacheStatus::Pending, None))?;

        let started = Instant::now();
        let outputs = match run_stage(stage.as_ref(), &data, &stage_config) {
            Ok(outputs) => outputs,
            Err(err) => {
                cache.record(&ctx.task.dir, &fp, CacheEntry::new(CacheStatus::Failed, None))?;
                write_log(ctx, input, &timings, Some(stage.id()));
                return Err(PipetreeError::StageFailure {
                    stage: stage.id().to_string(),
                    source: err,
                });
            }
        };
        let seconds = started.elapsed().as_secs_f64();

        let artifact = artifact_path(&ctx.task.dir, input, stage.id());
        write_json_atomic(&artifact, &outputs)?;
        cache.record(
            &ctx.task.dir,
            &fp,
            CacheEntry::new(CacheStatus::Done, Some(artifact)),
        )?;

        info!(
            task = %ctx.task.label(),
            %input,
            stage = stage.id(),
            seconds,
            "stage completed"
        );
        absorb_outputs(&mut data, stage.as_ref(), outputs);
        state.apply(stage.as_ref(), &fp);
        timings.push(StageTiming {
            stage: stage.id().to_string(),
            seconds,
            cached: false,
        });
    }

    export_results(ctx, input, &data)?;
    write_log(ctx, input, &timings, None);
    Ok(timings)
}

/// Invoke the stage and check that it produced exactly its declared outputs.
fn run_stage(
    stage: &dyn Stage,
    data: &PipelineData,
    config: &Config,
) -> anyhow::Result<PipelineData> {
    let outputs = stage.run(data, config)?;

    let declared: std::collections::BTreeSet<&str> = stage.outputs().iter().copied().collect();
    let produced: std::collections::BTreeSet<&str> =
        outputs.keys().map(String::as_str).collect();
    if declared != produced {
        return Err(anyhow!(
            "spurious or missing outputs: declared {declared:?}, produced {produced:?}"
        ));
    }
    Ok(outputs)
}

fn absorb_outputs(data: &mut PipelineData, stage: &dyn Stage, outputs: PipelineData) {
    data.extend(outputs);
    for key in stage.consumes() {
        data.remove(*key);
    }
}

fn artifact_path(task_dir: &Path, input: &InputId, stage_id: &str) -> PathBuf {
    task_dir
        .join(CACHE_DIRNAME)
        .join("artifacts")
        .join(input.to_string())
        .join(format!("{stage_id}.json"))
}

fn load_artifact(entry: &CacheEntry) -> anyhow::Result<PipelineData> {
    let path = entry
        .artifact
        .as_ref()
        .ok_or_else(|| anyhow!("entry has no artifact location"))?;
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading artifact {}", path.display()))?;
    let outputs: PipelineData = serde_json::from_str(&contents)
        .with_context(|| format!("decoding artifact {}", path.display()))?;
    Ok(outputs)
}

/// Write the item's persistent fields and final configuration to their
/// patterned locations, when the patterns are set.
fn export_results(ctx: &ItemContext<'_>, input: &InputId, data: &PipelineData) -> Result<()> {
    if let Some(pattern) = &ctx.task.spec.result_pathpattern {
        let path = paths::resolve_for_input(pattern, &ctx.task.dir, ctx.root_dir, input);
        let persistent = ctx.pipeline.persistent_fields();
        let exported: PipelineData = data
            .iter()
            .filter(|(key, _)| persistent.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        write_json_atomic(&path, &exported)?;
    }

    if let Some(pattern) = &ctx.task.spec.cfg_pathpattern {
        let path = paths::resolve_for_input(pattern, &ctx.task.dir, ctx.root_dir, input);
        write_json_atomic(&path, ctx.task.spec.config.entries())?;
    }

    Ok(())
}

/// Append a per-item processing log, when the pattern is set. Log problems
/// are reported but never fail the item.
fn write_log(
    ctx: &ItemContext<'_>,
    input: &InputId,
    timings: &[StageTiming],
    failed_stage: Option<&str>,
) {
    let Some(pattern) = &ctx.task.spec.log_pathpattern else {
        return;
    };
    let path = paths::resolve_for_input(pattern, &ctx.task.dir, ctx.root_dir, input);

    let mut lines = Vec::with_capacity(timings.len() + 1);
    for timing in timings {
        if timing.cached {
            lines.push(format!("{}: reused", timing.stage));
        } else {
            lines.push(format!("{}: {:.3}s", timing.stage, timing.seconds));
        }
    }
    lines.push(match failed_stage {
        Some(stage) => format!("failed at {stage}"),
        None => "completed".to_string(),
    });

    let write = || -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, lines.join("\n") + "\n")?;
        Ok(())
    };
    if let Err(err) = write() {
        warn!(path = %path.display(), %err, "could not write item log");
    }
}
