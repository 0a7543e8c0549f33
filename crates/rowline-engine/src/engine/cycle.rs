//! Circular dependency detection for formula columns.
//!
//! A formula column that (directly or through other formula columns) reads
//! itself can never settle. Schemas are checked with a depth-first search
//! when the calculator is built.

use std::collections::{HashMap, HashSet};

/// Formula field → formula fields it reads.
pub type DependencyGraph = HashMap<String, Vec<String>>;

/// Detect circular dependencies starting from a field.
/// Returns Some(cycle_path) if a cycle is found, None otherwise.
pub fn detect_cycle(start: &str, graph: &DependencyGraph) -> Option<Vec<String>> {
    let mut visiting = HashSet::new();
    let mut path = Vec::new();

    if detect_cycle_dfs(start, graph, &mut visiting, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn detect_cycle_dfs<'a>(
    current: &'a str,
    graph: &'a DependencyGraph,
    visiting: &mut HashSet<&'a str>,
    path: &mut Vec<String>,
) -> bool {
    if visiting.contains(current) {
        path.push(current.to_string());
        return true;
    }

    let Some(deps) = graph.get(current) else {
        return false;
    };

    visiting.insert(current);
    path.push(current.to_string());

    for dep in deps {
        if detect_cycle_dfs(dep, graph, visiting, path) {
            return true;
        }
    }

    path.pop();
    visiting.remove(current);
    false
}
