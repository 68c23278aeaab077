//! Circular dependency detection for calculated columns.
//!
//! A calculated column whose formula reads (directly or through other calculated columns)
//! its own value would never settle. Depth-first search over the formulas finds such a
//! loop before any row is evaluated.

use std::collections::{HashMap, HashSet};

use super::deps::extract_dependencies;
use super::expression::Expression;
use super::row::Column;

/// Detect a cycle reachable from `start`. Returns the path, ending with the repeated
/// column, if one is found.
pub fn detect_cycle(start: &Column, formulas: &HashMap<Column, Expression>) -> Option<Vec<Column>> {
    let mut visiting = HashSet::new();
    let mut path = Vec::new();

    if detect_cycle_dfs(start, formulas, &mut visiting, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn detect_cycle_dfs(
    current: &Column,
    formulas: &HashMap<Column, Expression>,
    visiting: &mut HashSet<Column>,
    path: &mut Vec<Column>,
) -> bool {
    if visiting.contains(current) {
        path.push(current.clone());
        return true;
    }

    let deps = match formulas.get(current) {
        Some(expression) => extract_dependencies(expression),
        None => return false,
    };

    visiting.insert(current.clone());
    path.push(current.clone());

    for dep in &deps {
        if detect_cycle_dfs(dep, formulas, visiting, path) {
            return true;
        }
    }

    path.pop();
    visiting.remove(current);
    false
}
