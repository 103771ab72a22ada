#![allow(dead_code)]

//! Deterministic stage implementations for engine tests.

use std::sync::{Arc, Mutex};

use anyhow::bail;
use pipetree::config::Config;
use pipetree::pipeline::{PipelineData, Stage, StageRegistry};
use serde_json::{json, Value};

/// Shared record of stage invocations, as `"<stage>:<input>"` strings in
/// execution order.
pub type InvocationLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> InvocationLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn log_entries(log: &InvocationLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// A stage that records every invocation and produces, for each declared
/// output, a value derived deterministically from its inputs and its
/// configuration namespace.
pub struct RecordingStage {
    id: String,
    inputs: Vec<&'static str>,
    outputs: Vec<&'static str>,
    log: InvocationLog,
    /// Fail whenever the `input` key equals this value.
    fail_on: Option<Value>,
}

impl RecordingStage {
    pub fn new(
        id: &str,
        inputs: &[&'static str],
        outputs: &[&'static str],
        log: InvocationLog,
    ) -> Self {
        Self {
            id: id.to_string(),
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            log,
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, input: Value) -> Self {
        self.fail_on = Some(input);
        self
    }
}

impl Stage for RecordingStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn inputs(&self) -> &[&str] {
        &self.inputs
    }

    fn outputs(&self) -> &[&str] {
        &self.outputs
    }

    fn run(&self, data: &PipelineData, config: &Config) -> anyhow::Result<PipelineData> {
        let input = data.get("input").cloned().unwrap_or(Value::Null);
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.id, render(&input)));

        if self.fail_on.as_ref() == Some(&input) {
            bail!("instructed to fail for input {}", render(&input));
        }

        let upstream: Vec<&Value> = self
            .inputs
            .iter()
            .filter_map(|key| data.get(*key))
            .collect();

        let mut out = PipelineData::new();
        for key in &self.outputs {
            out.insert(
                (*key).to_string(),
                json!({
                    "by": self.id,
                    "key": key,
                    "config": Value::Object(config.entries().clone()),
                    "upstream": upstream,
                }),
            );
        }
        Ok(out)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Registry with the canonical two-stage test pipeline:
/// `seg` (input -> mask) followed by `measure` (mask -> stats).
pub fn seg_measure_registry(log: &InvocationLog) -> StageRegistry {
    StageRegistry::new()
        .with(Arc::new(RecordingStage::new(
            "seg",
            &["input"],
            &["mask"],
            log.clone(),
        )))
        .with(Arc::new(RecordingStage::new(
            "measure",
            &["mask"],
            &["stats"],
            log.clone(),
        )))
}
