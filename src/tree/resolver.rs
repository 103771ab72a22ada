// src/tree/resolver.rs

//! Discovery and root-to-leaf resolution of the task hierarchy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use crate::errors::{PipetreeError, Result};
use crate::paths;
use crate::spec::{load_base_config, load_spec, TaskSpec};
use crate::tree::task::Task;
use crate::tree::validate::validate_hierarchy;
use crate::tree::{ResolutionError, TaskTree};

/// Resolve every task under `root`.
///
/// Directories without a specification file are transparent: their
/// descendants attach to the nearest ancestor directory that defines one.
/// Each task is merged exactly once, over the already-merged specification
/// of its parent, so resolution performs one merge per task.
///
/// A task that fails to resolve excludes its whole subtree and is reported
/// via [`TaskTree::errors`]; unrelated subtrees resolve normally. Only a
/// malformed hierarchy aborts resolution as a whole.
pub fn resolve(root: &Path) -> Result<TaskTree> {
    let root = root
        .canonicalize()
        .with_context(|| format!("resolving task tree root {}", root.display()))?;

    let dirs = crate::spec::discover(&root)?;
    debug!(root = %root.display(), count = dirs.len(), "discovered task directories");

    let mut tasks: BTreeMap<PathBuf, Task> = BTreeMap::new();
    let mut errors: Vec<ResolutionError> = Vec::new();
    let mut failed: Vec<PathBuf> = Vec::new();

    // Sorted discovery order guarantees parents are resolved before their
    // descendants, so each task merges against a memoized parent.
    for dir in dirs {
        let rel = dir
            .strip_prefix(&root)
            .map_err(|_| PipetreeError::InvalidTree(format!(
                "discovered directory {} outside of root {}",
                dir.display(),
                root.display()
            )))?
            .to_path_buf();

        if let Some(broken) = failed.iter().find(|f| rel.starts_with(f)) {
            warn!(
                task = %rel.display(),
                ancestor = %broken.display(),
                "skipping task below unresolvable ancestor"
            );
            continue;
        }

        let parent_key = nearest_ancestor(&tasks, &rel);
        let parent_spec = parent_key.as_ref().map(|key| tasks[key].spec.clone());

        match resolve_one(&dir, &rel, parent_spec.as_ref(), &root) {
            Ok(spec) => {
                if let Some(key) = &parent_key {
                    let parent = tasks.get_mut(key).unwrap();
                    parent.children.push(rel.clone());
                }
                tasks.insert(
                    rel.clone(),
                    Task {
                        path: rel,
                        dir,
                        spec,
                        parent: parent_key,
                        children: Vec::new(),
                    },
                );
            }
            Err(error) => {
                warn!(task = %rel.display(), %error, "task failed to resolve");
                failed.push(rel.clone());
                errors.push(ResolutionError { path: rel, error });
            }
        }
    }

    validate_hierarchy(&tasks)?;
    Ok(TaskTree::new(root, tasks, errors))
}

/// Merge the specification found in `dir` over the parent's effective one.
fn resolve_one(
    dir: &Path,
    rel: &Path,
    parent: Option<&TaskSpec>,
    root: &Path,
) -> Result<TaskSpec> {
    let own = load_spec(dir)?.ok_or_else(|| {
        PipetreeError::InvalidTree(format!("specification vanished in {}", rel.display()))
    })?;

    let base = match &own.base_config_path {
        Some(pattern) => {
            let path = paths::resolve(pattern, dir, root);
            Some(load_base_config(&path)?)
        }
        None => None,
    };

    let empty = TaskSpec::default();
    Ok(own.merge_over(parent.unwrap_or(&empty), base.as_ref()))
}

fn nearest_ancestor(tasks: &BTreeMap<PathBuf, Task>, rel: &Path) -> Option<PathBuf> {
    let mut current = rel.parent();
    while let Some(candidate) = current {
        if tasks.contains_key(candidate) {
            return Some(candidate.to_path_buf());
        }
        current = candidate.parent();
    }
    None
}
