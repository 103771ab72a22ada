// src/tree/validate.rs

//! Defensive validation of the resolved hierarchy.
//!
//! Filesystem nesting cannot produce a cyclic parent relation, but the
//! parent links are data like any other, so the resolved map is checked
//! before planning trusts it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{PipetreeError, Result};
use crate::tree::task::Task;

pub fn validate_hierarchy(tasks: &BTreeMap<PathBuf, Task>) -> Result<()> {
    let keys: Vec<&PathBuf> = tasks.keys().collect();
    let index_of = |path: &PathBuf| keys.binary_search(&path).ok();

    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for idx in 0..keys.len() {
        graph.add_node(idx);
    }

    for (child_idx, task) in tasks.values().enumerate() {
        let Some(parent) = &task.parent else {
            continue;
        };

        // Parent links must point at a known task on a strictly shorter path.
        let Some(parent_idx) = index_of(parent) else {
            return Err(PipetreeError::InvalidTree(format!(
                "task '{}' links to unknown parent '{}'",
                task.path.display(),
                parent.display()
            )));
        };
        if !task.path.starts_with(parent) || task.path == *parent {
            return Err(PipetreeError::InvalidTree(format!(
                "task '{}' has parent '{}' which is not an ancestor directory",
                task.path.display(),
                parent.display()
            )));
        }

        graph.add_edge(parent_idx, child_idx, ());
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(PipetreeError::InvalidTree(format!(
                "cycle detected in task hierarchy involving task '{}'",
                keys[node].display()
            )))
        }
    }
}
