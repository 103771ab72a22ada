// src/pipeline/pipeline.rs

//! Ordered stage sequences.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::pipeline::stage::Stage;

/// An ordered sequence of stages.
///
/// The order is determined automatically from the stages' declared inputs
/// and outputs: a stage becomes eligible once everything it requires is
/// produced by an earlier stage (or is the pipeline-provided `input` key).
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Build a pipeline for the given stages, ordering them by their data
    /// dependencies.
    ///
    /// Fails on duplicate stage identifiers, duplicate outputs, or when no
    /// total order satisfies the declared dependencies.
    pub fn from_stages(stages: Vec<Arc<dyn Stage>>) -> Result<Pipeline> {
        let ids: BTreeSet<&str> = stages.iter().map(|s| s.id()).collect();
        if ids.len() != stages.len() {
            bail!("ambiguous stage identifiers");
        }

        let mut seen_outputs: BTreeSet<&str> = BTreeSet::from(["input"]);
        for stage in &stages {
            for output in stage.outputs() {
                if !seen_outputs.insert(output) {
                    bail!("output '{output}' is produced more than once");
                }
            }
        }

        let mut available: BTreeSet<String> = BTreeSet::from(["input".to_string()]);
        let mut remaining = stages;
        let mut ordered: Vec<Arc<dyn Stage>> = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let next = remaining.iter().position(|candidate| {
                let satisfied = candidate
                    .inputs()
                    .iter()
                    .all(|key| available.contains(*key));

                // A stage that consumes a key other remaining stages still
                // need must wait for them.
                let conflicted = !candidate.consumes().is_empty()
                    && remaining.iter().any(|other| {
                        !std::ptr::eq(other.as_ref(), candidate.as_ref())
                            && candidate
                                .consumes()
                                .iter()
                                .all(|key| other.inputs().contains(key))
                    });

                satisfied && !conflicted
            });

            match next {
                Some(idx) => {
                    let stage = remaining.remove(idx);
                    available.extend(stage.outputs().iter().map(|s| s.to_string()));
                    for key in stage.consumes() {
                        available.remove(*key);
                    }
                    ordered.push(stage);
                }
                None => {
                    let stuck: Vec<&str> = remaining.iter().map(|s| s.id()).collect();
                    bail!(
                        "cannot order stages {stuck:?}: unsatisfied inputs (available: {:?})",
                        available
                    );
                }
            }
        }

        Ok(Pipeline { stages: ordered })
    }

    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Position of the stage with the given identifier.
    pub fn find(&self, stage_id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id() == stage_id)
    }

    /// Index of the last stage to execute.
    ///
    /// `None` means the whole pipeline. A trailing `+` on the identifier
    /// selects the stage after the named one (capped at the pipeline end).
    pub fn end_index(&self, last_stage: Option<&str>) -> Result<usize> {
        if self.stages.is_empty() {
            bail!("pipeline has no stages");
        }
        let Some(last_stage) = last_stage else {
            return Ok(self.stages.len() - 1);
        };

        let (id, offset) = match last_stage.strip_suffix('+') {
            Some(id) => (id, 1),
            None => (last_stage, 0),
        };

        match self.find(id) {
            Some(idx) => Ok((idx + offset).min(self.stages.len() - 1)),
            None => bail!("unknown stage '{id}' in last_stage"),
        }
    }

    /// All artifact keys the pipeline can produce, including `input`.
    pub fn fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::from(["input".to_string()]);
        for stage in &self.stages {
            fields.extend(stage.outputs().iter().map(|s| s.to_string()));
        }
        fields
    }

    /// Artifact keys that remain in the pipeline data after a full run:
    /// everything produced, minus the consumed keys.
    pub fn persistent_fields(&self) -> BTreeSet<String> {
        let mut fields = self.fields();
        for stage in &self.stages {
            for key in stage.consumes() {
                fields.remove(*key);
            }
        }
        fields
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.stages.iter().map(|s| s.id()).collect();
        f.debug_struct("Pipeline").field("stages", &ids).finish()
    }
}
