//! The expression tree.
//!
//! An [`Expression`] is an immutable value. Evaluation lives in `eval.rs`, the search in
//! `infer.rs`; this file holds construction, complexity and text rendering.

use super::locale::{Locale, format_double_literal};
use super::row::Column;
use super::value::Value;
use crate::builtins::{Binary, Function};

#[derive(Clone, Debug)]
pub enum Expression {
    /// A constant value.
    Literal(Value),
    /// The current cell's own value (the `input` passed to `apply`).
    Identity,
    /// A value from another column of the same row.
    Sibling(Column),
    /// A value from a column of the foreign row, used when matching rows across data sets.
    Foreign(Column),
    /// `op(second, first)`. Written `(second op first)`.
    Binary {
        first: Box<Expression>,
        second: Box<Expression>,
        op: Binary,
    },
    Function {
        arguments: Vec<Expression>,
        function: Function,
    },
}

/// The closed set of expression kinds, used to dispatch `suggest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    Literal,
    Identity,
    Sibling,
    Foreign,
    Binary,
    Function,
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Expression {
        Expression::Literal(value.into())
    }

    pub fn sibling(column: impl Into<Column>) -> Expression {
        Expression::Sibling(column.into())
    }

    pub fn foreign(column: impl Into<Column>) -> Expression {
        Expression::Foreign(column.into())
    }

    /// Build a binary node from its stored operands. Evaluates as `op(second, first)`.
    pub fn binary(first: Expression, second: Expression, op: Binary) -> Expression {
        Expression::Binary {
            first: Box::new(first),
            second: Box::new(second),
            op,
        }
    }

    /// Build a binary node from operands in reading order: `left op right`.
    pub fn binary_op(op: Binary, left: Expression, right: Expression) -> Expression {
        Expression::binary(right, left, op)
    }

    pub fn call(function: Function, arguments: Vec<Expression>) -> Expression {
        Expression::Function {
            arguments,
            function,
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            Expression::Literal(_) => Variant::Literal,
            Expression::Identity => Variant::Identity,
            Expression::Sibling(_) => Variant::Sibling,
            Expression::Foreign(_) => Variant::Foreign,
            Expression::Binary { .. } => Variant::Binary,
            Expression::Function { .. } => Variant::Function,
        }
    }

    /// Cost used to rank and prune candidates. Literals are expensive so that a formula
    /// built from the row's own data beats one that hard-codes the answer.
    pub fn complexity(&self) -> usize {
        match self {
            Expression::Literal(_) => 10,
            Expression::Identity | Expression::Sibling(_) | Expression::Foreign(_) => 1,
            Expression::Binary { first, second, .. } => {
                first.complexity() + second.complexity() + 1
            }
            Expression::Function { arguments, .. } => {
                let deepest = arguments
                    .iter()
                    .map(Expression::complexity)
                    .max()
                    .unwrap_or(1)
                    .max(1);
                deepest + 1
            }
        }
    }

    /// Formula text that parses back (with the same locale) to an equivalent tree.
    ///
    /// `Invalid` literals have no formula form and are written as the empty constant.
    pub fn to_formula(&self, locale: &Locale) -> String {
        match self {
            Expression::Literal(value) => literal_formula(value, locale),
            Expression::Identity => locale.current_cell_identifier.to_string(),
            Expression::Sibling(column) => format!("[@{}]", column.name()),
            Expression::Foreign(column) => format!("[#{}]", column.name()),
            Expression::Binary { first, second, op } => format!(
                "({}{}{})",
                second.to_formula(locale),
                op.token(),
                first.to_formula(locale)
            ),
            Expression::Function {
                arguments,
                function,
            } => {
                let separator = locale.argument_separator.to_string();
                let args: Vec<String> = arguments.iter().map(|a| a.to_formula(locale)).collect();
                format!("{}({})", function.name(locale), args.join(&separator))
            }
        }
    }

    /// Human-readable description.
    pub fn explain(&self, locale: &Locale) -> String {
        match self {
            Expression::Literal(Value::String(s)) => {
                format!("{q}{s}{q}", q = locale.string_qualifier)
            }
            Expression::Literal(value) => locale.local_string_for(value),
            Expression::Identity => locale.current_value_phrase.to_string(),
            Expression::Sibling(column) => format!("{} {}", locale.sibling_phrase, column),
            Expression::Foreign(column) => format!("{} {}", locale.foreign_phrase, column),
            Expression::Binary { first, second, op } => format!(
                "{} {} {}",
                second.explain(locale),
                op.explain(locale),
                first.explain(locale)
            ),
            Expression::Function {
                arguments,
                function,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.explain(locale)).collect();
                format!("{}({})", function.explain(locale), args.join(", "))
            }
        }
    }

    /// Pre-order traversal of this node and all sub-expressions.
    pub fn visit(&self, callback: &mut impl FnMut(&Expression)) {
        callback(self);
        match self {
            Expression::Binary { first, second, .. } => {
                first.visit(callback);
                second.visit(callback);
            }
            Expression::Function { arguments, .. } => {
                for argument in arguments {
                    argument.visit(callback);
                }
            }
            Expression::Literal(_)
            | Expression::Identity
            | Expression::Sibling(_)
            | Expression::Foreign(_) => {}
        }
    }

    /// Structural equality. Literal values compare with [`Value::is_identical`].
    pub fn is_identical(&self, other: &Expression) -> bool {
        match (self, other) {
            (Expression::Literal(a), Expression::Literal(b)) => a.is_identical(b),
            (Expression::Identity, Expression::Identity) => true,
            (Expression::Sibling(a), Expression::Sibling(b)) => a == b,
            (Expression::Foreign(a), Expression::Foreign(b)) => a == b,
            (
                Expression::Binary {
                    first: f1,
                    second: s1,
                    op: o1,
                },
                Expression::Binary {
                    first: f2,
                    second: s2,
                    op: o2,
                },
            ) => o1 == o2 && f1.is_identical(f2) && s1.is_identical(s2),
            (
                Expression::Function {
                    arguments: a1,
                    function: fn1,
                },
                Expression::Function {
                    arguments: a2,
                    function: fn2,
                },
            ) => {
                fn1 == fn2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| x.is_identical(y))
            }
            _ => false,
        }
    }
}

fn literal_formula(value: &Value, locale: &Locale) -> String {
    match value {
        Value::String(s) => {
            let q = locale.string_qualifier;
            let escaped = s.replace(q, locale.string_qualifier_escape);
            format!("{q}{escaped}{q}")
        }
        Value::Double(d) => format_double_literal(*d),
        Value::Int(i) => i.to_string(),
        Value::Bool(b) => locale.bool_constant(*b).to_string(),
        Value::Empty | Value::Invalid => locale.empty_constant.to_string(),
    }
}
