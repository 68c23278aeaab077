//! Expression evaluation and constant folding.
//!
//! `apply` is total: missing columns, missing foreign rows and type errors all come back
//! as `Value::Invalid`. Operands are always evaluated in full; nothing short-circuits.
//! Operator operands and function arguments see the same `input` as their parent.

use super::expression::Expression;
use super::row::Row;
use super::value::Value;
use crate::builtins::Function;

impl Expression {
    /// Evaluate against `row`. `foreign` serves `Foreign` lookups, `input` serves `Identity`.
    pub fn apply(&self, row: &Row, foreign: Option<&Row>, input: Option<&Value>) -> Value {
        match self {
            Expression::Literal(value) => value.clone(),
            Expression::Identity => input.cloned().unwrap_or(Value::Invalid),
            Expression::Sibling(column) => row.get(column).cloned().unwrap_or(Value::Invalid),
            Expression::Foreign(column) => foreign
                .and_then(|r| r.get(column))
                .cloned()
                .unwrap_or(Value::Invalid),
            Expression::Binary { first, second, op } => {
                let first = first.apply(row, foreign, input);
                let second = second.apply(row, foreign, input);
                op.apply(&second, &first)
            }
            Expression::Function {
                arguments,
                function,
            } => {
                let values: Vec<Value> = arguments
                    .iter()
                    .map(|a| a.apply(row, foreign, input))
                    .collect();
                function.apply(&values)
            }
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Identity | Expression::Sibling(_) | Expression::Foreign(_) => false,
            Expression::Binary { first, second, .. } => first.is_constant() && second.is_constant(),
            Expression::Function {
                arguments,
                function,
            } => function.is_deterministic() && arguments.iter().all(Expression::is_constant),
        }
    }

    /// Fold every constant sub-tree into a literal and drop `IDENTITY(x)` wrappers.
    pub fn prepare(&self) -> Expression {
        if self.is_constant() {
            return match self {
                Expression::Literal(_) => self.clone(),
                _ => Expression::Literal(self.apply(&Row::new(), None, None)),
            };
        }

        match self {
            Expression::Binary { first, second, op } => {
                Expression::binary(first.prepare(), second.prepare(), *op)
            }
            Expression::Function {
                arguments,
                function: Function::Identity,
            } if arguments.len() == 1 => arguments[0].prepare(),
            Expression::Function {
                arguments,
                function,
            } => Expression::call(*function, arguments.iter().map(Expression::prepare).collect()),
            _ => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Binary;

    fn row() -> Row {
        Row::from_pairs([("a", Value::Int(2)), ("b", Value::from("x"))]).unwrap()
    }

    #[test]
    fn test_leaves() {
        let r = row();
        assert_eq!(Expression::literal(5i64).apply(&r, None, None), Value::Int(5));
        assert_eq!(Expression::sibling("a").apply(&r, None, None), Value::Int(2));
        assert!(Expression::sibling("zz").apply(&r, None, None).is_invalid());
        assert!(Expression::Identity.apply(&r, None, None).is_invalid());
        assert_eq!(
            Expression::Identity.apply(&r, None, Some(&Value::from("me"))),
            Value::from("me")
        );
    }

    #[test]
    fn test_foreign_needs_foreign_row() {
        let r = row();
        let other = Row::from_pairs([("a", 7i64)]).unwrap();
        let e = Expression::foreign("a");
        assert!(e.apply(&r, None, None).is_invalid());
        assert_eq!(e.apply(&r, Some(&other), None), Value::Int(7));
    }

    #[test]
    fn test_binary_operand_order() {
        // first = 1, second = 10: evaluates 10 - 1.
        let e = Expression::binary(
            Expression::literal(1i64),
            Expression::literal(10i64),
            Binary::Subtraction,
        );
        assert_eq!(e.apply(&Row::new(), None, None), Value::Int(9));
    }

    #[test]
    fn test_identity_input_reaches_operands() {
        let e = Expression::binary_op(Binary::Multiplication, Expression::Identity, Expression::sibling("a"));
        assert_eq!(e.apply(&row(), None, Some(&Value::Int(4))), Value::Int(8));
    }

    #[test]
    fn test_is_constant() {
        assert!(Expression::call(Function::Upper, vec![Expression::literal("a")]).is_constant());
        assert!(!Expression::call(Function::Random, vec![]).is_constant());
        assert!(!Expression::binary_op(Binary::Addition, Expression::literal(1i64), Expression::Identity).is_constant());
    }

    #[test]
    fn test_prepare_folds_constants() {
        let e = Expression::binary_op(
            Binary::Addition,
            Expression::sibling("a"),
            Expression::binary_op(Binary::Multiplication, Expression::literal(2i64), Expression::literal(3i64)),
        );
        let prepared = e.prepare();
        let expected = Expression::binary_op(Binary::Addition, Expression::sibling("a"), Expression::literal(6i64));
        assert!(prepared.is_identical(&expected));
        assert!(prepared.prepare().is_identical(&prepared));
        assert_eq!(prepared.apply(&row(), None, None), e.apply(&row(), None, None));
    }

    #[test]
    fn test_prepare_keeps_random_and_unwraps_identity_function() {
        let random = Expression::call(Function::Random, vec![]);
        assert!(random.prepare().is_identical(&random));

        let wrapped = Expression::call(Function::Identity, vec![Expression::sibling("b")]);
        assert!(wrapped.prepare().is_identical(&Expression::sibling("b")));
    }
}
