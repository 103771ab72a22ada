#![allow(dead_code)]

//! Builders for on-disk task trees used by the integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tempfile::TempDir;

/// Builder for one `task.json` specification.
#[derive(Clone, Default)]
pub struct SpecBuilder {
    fields: Map<String, Value>,
}

impl SpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runnable(mut self, value: bool) -> Self {
        self.fields.insert("runnable".into(), json!(value));
        self
    }

    pub fn inputs(mut self, value: Value) -> Self {
        self.fields.insert("inputs".into(), value);
        self
    }

    pub fn pipeline(mut self, stages: &[&str]) -> Self {
        self.fields.insert("pipeline".into(), json!(stages));
        self
    }

    pub fn last_stage(mut self, stage: &str) -> Self {
        self.fields.insert("last_stage".into(), json!(stage));
        self
    }

    pub fn base_config_path(mut self, path: &str) -> Self {
        self.fields.insert("base_config_path".into(), json!(path));
        self
    }

    pub fn result_pathpattern(mut self, pattern: &str) -> Self {
        self.fields.insert("result_pathpattern".into(), json!(pattern));
        self
    }

    pub fn log_pathpattern(mut self, pattern: &str) -> Self {
        self.fields.insert("log_pathpattern".into(), json!(pattern));
        self
    }

    pub fn cfg_pathpattern(mut self, pattern: &str) -> Self {
        self.fields.insert("cfg_pathpattern".into(), json!(pattern));
        self
    }

    /// Set one parameter below `config`, e.g. `("seg/threshold", json!(5))`.
    pub fn config(mut self, key: &str, value: Value) -> Self {
        let config = self
            .fields
            .entry("config".to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        let mut current = config.as_object_mut().expect("config must be a mapping");
        let mut segments: Vec<&str> = key.split('/').collect();
        let last = segments.pop().expect("empty config key");
        for segment in segments {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = slot.as_object_mut().expect("config path hits a scalar");
        }
        current.insert(last.to_string(), value);
        self
    }

    pub fn environ(mut self, name: &str, value: &str) -> Self {
        let environ = self
            .fields
            .entry("environ".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        environ
            .as_object_mut()
            .expect("environ must be a mapping")
            .insert(name.to_string(), json!(value));
        self
    }

    pub fn build_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Builds a task directory tree inside a temp directory.
///
/// The temp directory is removed when the builder is dropped; keep it alive
/// for the duration of the test.
pub struct TreeBuilder {
    root: TempDir,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("creating temp task tree"),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Write `task.json` for the task directory at `rel` ("" for the root).
    pub fn task(self, rel: &str, spec: SpecBuilder) -> Self {
        let dir = self.dir(rel);
        fs::create_dir_all(&dir).expect("creating task directory");
        let payload =
            serde_json::to_string_pretty(&spec.build_value()).expect("encoding specification");
        fs::write(dir.join("task.json"), payload).expect("writing task.json");
        self
    }

    /// Write an arbitrary JSON file relative to the root (e.g. base configs).
    pub fn file(self, rel: &str, value: Value) -> Self {
        let path = self.root.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("creating parent directory");
        }
        fs::write(path, serde_json::to_string_pretty(&value).unwrap())
            .expect("writing JSON file");
        self
    }

    pub fn dir(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.path().to_path_buf()
        } else {
            self.root.path().join(rel)
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
