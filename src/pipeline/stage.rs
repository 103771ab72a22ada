// src/pipeline/stage.rs

//! The stage capability interface and the stage registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::Config;

/// The per-item carrier of intermediate artifacts, passed from stage to
/// stage during one execution. The pipeline seeds the `input` key; each
/// stage adds the outputs it declares.
pub type PipelineData = BTreeMap<String, serde_json::Value>;

/// One step of a pipeline.
///
/// Implementations are opaque to the engine: all it relies on are the
/// declared artifact keys and the [`run`](Stage::run) entry point. Each
/// stage reads its hyperparameters from the configuration namespace named
/// after its identifier.
pub trait Stage: Send + Sync {
    /// Stage identifier; also the stage's configuration namespace.
    fn id(&self) -> &str;

    /// Artifact keys this stage requires.
    fn inputs(&self) -> &[&str] {
        &[]
    }

    /// Artifact keys this stage produces.
    fn outputs(&self) -> &[&str] {
        &[]
    }

    /// Artifact keys removed from the pipeline data after this stage runs;
    /// unavailable to later stages. Every consumed key must also be
    /// declared in [`inputs`](Stage::inputs).
    fn consumes(&self) -> &[&str] {
        &[]
    }

    /// Process one item: read the declared inputs from `data`, return the
    /// declared outputs.
    fn run(&self, data: &PipelineData, config: &Config) -> Result<PipelineData>;
}

/// Maps stage identifiers to implementations.
///
/// Specifications refer to stages by identifier; the embedding application
/// registers the implementations it was compiled with.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under its identifier. Replaces any previous
    /// registration with the same identifier.
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(stage.id().to_string(), stage);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, stage: Arc<dyn Stage>) -> Self {
        self.register(stage);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(id).cloned()
    }

    /// Look up the given stage identifiers and build a pipeline from them.
    pub fn build_pipeline(&self, ids: &[String]) -> Result<super::Pipeline> {
        let mut stages = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(id) {
                Some(stage) => stages.push(stage),
                None => bail!("unknown stage '{id}'"),
            }
        }
        super::Pipeline::from_stages(stages)
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal stage for engine-level tests: declares keys, produces a
    /// constant marker value per output.
    pub(crate) struct TestStage {
        id: String,
        inputs: Vec<&'static str>,
        outputs: Vec<&'static str>,
        consumes: Vec<&'static str>,
    }

    impl TestStage {
        pub(crate) fn new(id: &str, inputs: &[&'static str], outputs: &[&'static str]) -> Self {
            Self {
                id: id.to_string(),
                inputs: inputs.to_vec(),
                outputs: outputs.to_vec(),
                consumes: Vec::new(),
            }
        }

        pub(crate) fn consuming(mut self, consumes: &[&'static str]) -> Self {
            self.consumes = consumes.to_vec();
            self
        }
    }

    impl Stage for TestStage {
        fn id(&self) -> &str {
            &self.id
        }

        fn inputs(&self) -> &[&str] {
            &self.inputs
        }

        fn outputs(&self) -> &[&str] {
            &self.outputs
        }

        fn consumes(&self) -> &[&str] {
            &self.consumes
        }

        fn run(&self, _data: &PipelineData, _config: &Config) -> Result<PipelineData> {
            let mut out = PipelineData::new();
            for key in &self.outputs {
                out.insert((*key).to_string(), serde_json::json!(format!("{}:{key}", self.id)));
            }
            Ok(out)
        }
    }

    #[test]
    fn registry_lookup_and_replacement() {
        let mut registry = StageRegistry::new();
        registry.register(Arc::new(TestStage::new("seg", &["input"], &["mask"])));
        assert!(registry.get("seg").is_some());
        assert!(registry.get("other").is_none());

        registry.register(Arc::new(TestStage::new("seg", &["input"], &["mask2"])));
        assert_eq!(registry.get("seg").unwrap().outputs(), &["mask2"]);
    }

    #[test]
    fn build_pipeline_rejects_unknown_ids() {
        let registry =
            StageRegistry::new().with(Arc::new(TestStage::new("seg", &["input"], &["mask"])));
        let err = registry
            .build_pipeline(&["seg".to_string(), "measure".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("unknown stage 'measure'"));
    }
}
