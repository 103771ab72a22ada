// src/tree/mod.rs

//! Task hierarchy resolution.
//!
//! - [`task`] defines the resolved [`Task`] node.
//! - [`resolver`] discovers specifications in a directory tree and merges
//!   them along each root-to-leaf path.
//! - [`validate`] defensively checks the resolved hierarchy.
//!
//! Tasks are stored in a path-indexed map with parent/child links held as
//! path keys, so the tree has no cyclic ownership and can be shared across
//! workers behind an `Arc`.

pub mod resolver;
pub mod task;
pub mod validate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::PipetreeError;

pub use task::Task;

/// A task that could not be resolved; its whole subtree is excluded from
/// planning, unrelated subtrees are unaffected.
#[derive(Debug)]
pub struct ResolutionError {
    /// Path of the failed task, relative to the tree root.
    pub path: PathBuf,
    pub error: PipetreeError,
}

/// The resolved task hierarchy of one directory tree.
///
/// Keys are task directories relative to the root; the root task (if the
/// root directory itself defines one) has the empty path. Map order puts
/// every ancestor before its descendants.
#[derive(Debug)]
pub struct TaskTree {
    root: PathBuf,
    tasks: BTreeMap<PathBuf, Task>,
    errors: Vec<ResolutionError>,
}

impl TaskTree {
    pub(crate) fn new(
        root: PathBuf,
        tasks: BTreeMap<PathBuf, Task>,
        errors: Vec<ResolutionError>,
    ) -> Self {
        Self { root, tasks, errors }
    }

    /// Absolute root directory of the tree.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, path: &Path) -> Option<&Task> {
        self.tasks.get(path)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All tasks, ancestors before descendants.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Subtrees that failed to resolve.
    pub fn errors(&self) -> &[ResolutionError] {
        &self.errors
    }

    /// The ancestor chain of `task`, nearest first.
    pub fn ancestors<'a>(&'a self, task: &'a Task) -> Vec<&'a Task> {
        let mut chain = Vec::new();
        let mut current = task.parent.as_deref();
        while let Some(path) = current {
            match self.tasks.get(path) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent.parent.as_deref();
                }
                None => break,
            }
        }
        chain
    }

    /// Absolute directories whose caches may satisfy work of `task`: the
    /// task's own directory first, then its ancestors, nearest first.
    pub fn cache_chain(&self, task: &Task) -> Vec<PathBuf> {
        let mut dirs = vec![task.dir.clone()];
        dirs.extend(self.ancestors(task).iter().map(|t| t.dir.clone()));
        dirs
    }
}
