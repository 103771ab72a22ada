// src/tree/task.rs

//! The resolved task node.

use std::path::{Path, PathBuf};

use crate::errors::{PipetreeError, Result};
use crate::spec::{decode_inputs, InputId, TaskSpec};

/// One resolved task.
///
/// The specification is the task's own record merged over everything it
/// inherits; it is not mutated after resolution. Parent and children are
/// held as path keys into the owning [`TaskTree`](crate::tree::TaskTree).
#[derive(Debug, Clone)]
pub struct Task {
    /// Task directory relative to the tree root (empty for the root task).
    pub path: PathBuf,

    /// Absolute task directory.
    pub dir: PathBuf,

    /// Effective specification.
    pub spec: TaskSpec,

    /// Nearest ancestor directory that also defines a task.
    pub parent: Option<PathBuf>,

    /// Tasks directly below this one, in path order.
    pub children: Vec<PathBuf>,
}

impl Task {
    /// Whether this task may be executed; non-runnable tasks are templates.
    pub fn runnable(&self) -> bool {
        self.spec.runnable.unwrap_or(false)
    }

    /// The decoded input items of this task.
    pub fn inputs(&self) -> Result<Vec<InputId>> {
        match &self.spec.inputs {
            Some(spec) => decode_inputs(spec).map_err(|err| {
                PipetreeError::conflict(&self.dir, format!("invalid inputs: {err}"))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Human-readable task name for reports and logs.
    pub fn label(&self) -> String {
        if self.path.as_os_str().is_empty() {
            ".".to_string()
        } else {
            self.path.display().to_string()
        }
    }

    /// Whether this task lies inside the subtree rooted at `dir_path`
    /// (relative to the tree root), including `dir_path` itself.
    pub fn is_within(&self, dir_path: &Path) -> bool {
        self.path.starts_with(dir_path)
    }
}
