// src/spec/loader.rs

//! Reading specification and base-config files from disk.
//!
//! This only performs JSON deserialization; inheritance and validation
//! happen when the task tree is resolved.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::errors::{PipetreeError, Result};
use crate::spec::model::TaskSpec;

/// Name of the specification file that marks a directory as a task.
pub const SPEC_FILENAME: &str = "task.json";

/// Load the specification of the task directory `dir`, or `None` if the
/// directory does not define a task.
pub fn load_spec(dir: &Path) -> Result<Option<TaskSpec>> {
    let path = dir.join(SPEC_FILENAME);
    if !path.is_file() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)?;
    let spec: TaskSpec = serde_json::from_str(&contents)
        .map_err(|err| PipetreeError::conflict(&path, format!("invalid specification: {err}")))?;

    debug!(path = %path.display(), "loaded task specification");
    Ok(Some(spec))
}

/// Load a base configuration file (JSON namespaces).
pub fn load_base_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path).map_err(|err| {
        PipetreeError::conflict(path, format!("cannot read base config: {err}"))
    })?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|err| PipetreeError::conflict(path, format!("invalid base config: {err}")))?;

    match value {
        serde_json::Value::Object(entries) => Ok(Config::from_map(entries)),
        _ => Err(PipetreeError::conflict(
            path,
            "base config must be a mapping of namespaces",
        )),
    }
}

/// Find every directory under `root` (inclusive) that contains a
/// specification file. Results are sorted, so ancestors precede their
/// descendants. Dot-directories are not descended into.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(root, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    if dir.join(SPEC_FILENAME).is_file() {
        found.push(dir.to_path_buf());
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        walk(&path, found)?;
    }
    Ok(())
}
