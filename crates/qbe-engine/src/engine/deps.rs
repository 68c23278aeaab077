//! Dependency extraction from expressions.
//!
//! Walks an expression with [`Expression::visit`] to find the columns it reads. Used to
//! order calculated columns and to reject formulas that depend on themselves.

use std::collections::HashSet;

use super::expression::Expression;
use super::row::Column;

/// Sibling columns the expression reads, deduplicated, in first-seen order.
pub fn extract_dependencies(expression: &Expression) -> Vec<Column> {
    collect(expression, |e| match e {
        Expression::Sibling(column) => Some(column),
        _ => None,
    })
}

/// Foreign-row columns the expression reads, deduplicated, in first-seen order.
pub fn extract_foreign_dependencies(expression: &Expression) -> Vec<Column> {
    collect(expression, |e| match e {
        Expression::Foreign(column) => Some(column),
        _ => None,
    })
}

fn collect(expression: &Expression, pick: fn(&Expression) -> Option<&Column>) -> Vec<Column> {
    let mut seen = HashSet::new();
    let mut deps = Vec::new();
    expression.visit(&mut |e| {
        if let Some(column) = pick(e) {
            if seen.insert(column.clone()) {
                deps.push(column.clone());
            }
        }
    });
    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Locale, parse_formula};

    #[test]
    fn test_extract_dependencies_dedupes_in_order() {
        let e = parse_formula("[@b]&[@a]&UPPER([@b])&[#c]", &Locale::english()).unwrap();
        assert_eq!(extract_dependencies(&e), vec![Column::new("b"), Column::new("a")]);
        assert_eq!(extract_foreign_dependencies(&e), vec![Column::new("c")]);
    }

    #[test]
    fn test_literals_have_no_dependencies() {
        let e = parse_formula("\"[@a]\"&RC", &Locale::english()).unwrap();
        assert!(extract_dependencies(&e).is_empty());
    }
}
