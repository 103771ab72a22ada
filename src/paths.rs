// src/paths.rs

//! Path pattern resolution.
//!
//! Patterns in task specifications may contain placeholders:
//!
//! - `{ROOTDIR}`: the root directory of the task tree
//! - `{DIRNAME}`: the name of the task directory
//! - `{input}`: the input item identifier (per-input patterns only)
//!
//! Relative results are resolved against the task directory.

use std::path::{Path, PathBuf};

use crate::spec::InputId;

/// Expand the directory placeholders in `pattern` and resolve the result
/// against `task_dir`.
pub fn resolve(pattern: &str, task_dir: &Path, root_dir: &Path) -> PathBuf {
    let dirname = task_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let expanded = pattern
        .replace("{ROOTDIR}", &root_dir.to_string_lossy())
        .replace("{DIRNAME}", &dirname);

    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        path
    } else {
        task_dir.join(path)
    }
}

/// Expand a per-input pattern: `{input}` plus the directory placeholders.
pub fn resolve_for_input(
    pattern: &str,
    task_dir: &Path,
    root_dir: &Path,
    input: &InputId,
) -> PathBuf {
    let expanded = pattern.replace("{input}", &input.to_string());
    resolve(&expanded, task_dir, root_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_patterns_resolve_against_task_dir() {
        let path = resolve("out/result.json", Path::new("/data/sweep/a"), Path::new("/data"));
        assert_eq!(path, PathBuf::from("/data/sweep/a/out/result.json"));
    }

    #[test]
    fn dirname_and_rootdir_placeholders() {
        let path = resolve(
            "{ROOTDIR}/shared/{DIRNAME}.json",
            Path::new("/data/sweep/a"),
            Path::new("/data"),
        );
        assert_eq!(path, PathBuf::from("/data/shared/a.json"));
    }

    #[test]
    fn input_placeholder() {
        let path = resolve_for_input(
            "results/{input}.json",
            Path::new("/data/t"),
            Path::new("/data"),
            &InputId::Num(7),
        );
        assert_eq!(path, PathBuf::from("/data/t/results/7.json"));
    }
}
