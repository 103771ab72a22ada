// src/spec/model.rs

//! Serde model of a task specification and the inheritance rules that
//! combine a specification with the one inherited from the parent task.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::spec::inputs::InputsSpec;

/// One task specification, as written in a `task.json` file.
///
/// Every field is optional; absent fields inherit from the parent task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSpec {
    /// Whether the task may be executed. Tasks that are not runnable act as
    /// templates for the tasks nested beneath them.
    pub runnable: Option<bool>,

    /// The input items the pipeline is applied to.
    pub inputs: Option<InputsSpec>,

    /// Identifiers of the pipeline stages, resolved against the registry.
    pub pipeline: Option<Vec<String>>,

    /// Run the pipeline only up to and including this stage. A trailing `+`
    /// means "up to and including the stage after the named one".
    pub last_stage: Option<String>,

    /// Where input files live (informational; handed to stages).
    pub input_pathpattern: Option<String>,

    /// Where the persistent fields of each processed item are written.
    pub result_pathpattern: Option<String>,

    /// Where the per-item processing log is written.
    pub log_pathpattern: Option<String>,

    /// Where the final per-item configuration is written.
    pub cfg_pathpattern: Option<String>,

    /// Optional external configuration file, merged below the task's own
    /// `config` section. Resolved relative to the task directory.
    pub base_config_path: Option<String>,

    /// Hyperparameter namespaces for the pipeline stages.
    pub config: Config,

    /// Environment variables associated with the task.
    pub environ: BTreeMap<String, String>,
}

impl TaskSpec {
    /// Combine this specification with the effective specification of the
    /// parent task.
    ///
    /// - Scalar fields: the leaf-most non-absent value wins.
    /// - `inputs`: a non-empty value replaces the inherited one; an absent
    ///   or empty value inherits unchanged.
    /// - `config`: recursive namespace merge, parent first, then the
    ///   `base` configuration (the task's `base_config_path` file, loaded
    ///   by the caller), then the task's own section.
    /// - `environ`: per-variable override, inherited variables retained.
    pub fn merge_over(&self, parent: &TaskSpec, base: Option<&Config>) -> TaskSpec {
        let mut config = parent.config.clone();
        if let Some(base) = base {
            config.merge(base);
        }
        config.merge(&self.config);

        let mut environ = parent.environ.clone();
        environ.extend(self.environ.clone());

        TaskSpec {
            runnable: self.runnable.or(parent.runnable),
            inputs: match &self.inputs {
                Some(spec) if !spec.is_empty() => Some(spec.clone()),
                _ => parent.inputs.clone(),
            },
            pipeline: self.pipeline.clone().or_else(|| parent.pipeline.clone()),
            last_stage: self
                .last_stage
                .clone()
                .or_else(|| parent.last_stage.clone()),
            input_pathpattern: self
                .input_pathpattern
                .clone()
                .or_else(|| parent.input_pathpattern.clone()),
            result_pathpattern: self
                .result_pathpattern
                .clone()
                .or_else(|| parent.result_pathpattern.clone()),
            log_pathpattern: self
                .log_pathpattern
                .clone()
                .or_else(|| parent.log_pathpattern.clone()),
            cfg_pathpattern: self
                .cfg_pathpattern
                .clone()
                .or_else(|| parent.cfg_pathpattern.clone()),
            base_config_path: self
                .base_config_path
                .clone()
                .or_else(|| parent.base_config_path.clone()),
            config,
            environ,
        }
    }

    /// Content digest of the full specification, used for completion
    /// digests. Covers every field, including the merged configuration.
    pub fn digest(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}
