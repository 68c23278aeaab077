//! Calculated columns.
//!
//! A [`Calculation`] is an ordered list of `(column, formula)` steps. Each step sees the
//! row as left by the steps before it, with the column's current value as the `RC`
//! input. A formula that names its own column reads that same current value, so it is
//! stored as `RC` and is not a dependency cycle.

use std::collections::HashMap;
use std::sync::Arc;

use qbe_engine::engine::{Column, Expression, Locale, Row, detect_cycle, parse_formula};
use qbe_engine::parallel::{CHUNK_SIZE, parallel};
use qbe_engine::{Fallible, Future};

use crate::error::{QbeError, Result};

#[derive(Clone, Debug, Default)]
pub struct Calculation {
    steps: Vec<(Column, Expression)>,
}

impl Calculation {
    /// Build a calculation, rejecting formulas that depend on each other in a loop.
    pub fn new(steps: Vec<(Column, Expression)>) -> Result<Calculation> {
        let steps: Vec<(Column, Expression)> = steps
            .into_iter()
            .map(|(column, expression)| {
                let expression = replace_self_reference(&expression, &column).prepare();
                (column, expression)
            })
            .collect();

        let formulas: HashMap<Column, Expression> = steps.iter().cloned().collect();
        for (column, _) in &steps {
            if let Some(path) = detect_cycle(column, &formulas) {
                tracing::debug!(?path, "rejecting circular calculation");
                return Err(QbeError::CircularDependency {
                    column: column.clone(),
                });
            }
        }
        Ok(Calculation { steps })
    }

    /// Build a calculation from `(column, formula text)` pairs.
    pub fn parse<I, C, S>(formulas: I, locale: &Locale) -> Result<Calculation>
    where
        I: IntoIterator<Item = (C, S)>,
        C: Into<Column>,
        S: AsRef<str>,
    {
        let steps = formulas
            .into_iter()
            .map(|(column, text)| Ok((column.into(), parse_formula(text.as_ref(), locale)?)))
            .collect::<Result<Vec<_>>>()?;
        Calculation::new(steps)
    }

    pub fn steps(&self) -> &[(Column, Expression)] {
        &self.steps
    }

    pub fn apply(&self, row: &Row) -> Row {
        let mut row = row.clone();
        for (column, expression) in &self.steps {
            let value = expression.apply(&row, None, row.get(column));
            row = row.with_value(column.clone(), value);
        }
        row
    }

    /// Apply to every row, in chunks on the worker pool of the job passed to
    /// [`Future::get`]. A cancelled job yields a failure rather than a partial table.
    pub fn apply_all(&self, rows: Arc<Vec<Row>>) -> Future<Fallible<Vec<Row>>> {
        let calculation = Arc::new(self.clone());
        Future::new(move |batch| {
            let calculation = calculation.clone();
            let capacity = rows.len();
            let chunks = parallel(
                rows.clone(),
                CHUNK_SIZE,
                move |chunk: &[Row]| chunk.iter().map(|row| calculation.apply(row)).collect::<Vec<_>>(),
                Vec::with_capacity(capacity),
                |mut out: Vec<Row>, chunk: Vec<Row>| {
                    out.extend(chunk);
                    out
                },
            );
            let worker = batch.clone();
            chunks.get(Some(batch.job()), move |rows: Option<Vec<Row>>| {
                worker.satisfy(match rows {
                    Some(rows) => Fallible::Success(rows),
                    None => Fallible::failure("cancelled"),
                });
            });
        })
    }
}

fn replace_self_reference(expression: &Expression, own: &Column) -> Expression {
    match expression {
        Expression::Sibling(column) if column == own => Expression::Identity,
        Expression::Binary { first, second, op } => Expression::binary(
            replace_self_reference(first, own),
            replace_self_reference(second, own),
            *op,
        ),
        Expression::Function {
            arguments,
            function,
        } => Expression::call(
            *function,
            arguments
                .iter()
                .map(|a| replace_self_reference(a, own))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbe_engine::engine::Value;
    use std::sync::mpsc;
    use std::time::Duration;

    fn people() -> Vec<Row> {
        vec![
            Row::from_pairs([("first", "John"), ("last", "Doe")]).unwrap(),
            Row::from_pairs([("first", "Ann"), ("last", "Roe")]).unwrap(),
        ]
    }

    #[test]
    fn test_apply_appends_and_chains() {
        let calculation = Calculation::parse(
            [
                ("full", "[@first]&\" \"&[@last]"),
                ("shout", "UPPER([@full])"),
            ],
            &Locale::english(),
        )
        .unwrap();
        let row = calculation.apply(&people()[0]);
        assert_eq!(row.get("full"), Some(&Value::from("John Doe")));
        assert_eq!(row.get("shout"), Some(&Value::from("JOHN DOE")));
        assert_eq!(row.len(), 4);
    }

    #[test]
    fn test_apply_replaces_with_current_value_as_input() {
        let calculation = Calculation::parse([("first", "LOWER(RC)")], &Locale::english()).unwrap();
        let row = calculation.apply(&people()[0]);
        assert_eq!(row.get("first"), Some(&Value::from("john")));
        assert_eq!(row.index_of("first"), Some(0));
    }

    #[test]
    fn test_self_reference_reads_current_value() {
        let calculation = Calculation::parse([("first", "[@first]&\"!\"")], &Locale::english()).unwrap();
        assert!(matches!(
            calculation.steps()[0].1,
            Expression::Binary { ref second, .. } if matches!(**second, Expression::Identity)
        ));
        let row = calculation.apply(&people()[1]);
        assert_eq!(row.get("first"), Some(&Value::from("Ann!")));
    }

    #[test]
    fn test_rejects_cycle() {
        let result = Calculation::parse(
            [("a", "[@b]+1"), ("b", "[@a]*2")],
            &Locale::english(),
        );
        assert!(matches!(result, Err(QbeError::CircularDependency { .. })));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = Calculation::parse([("a", "[@b]+")], &Locale::english());
        assert!(matches!(result, Err(QbeError::Formula(_))));
    }

    #[test]
    fn test_missing_column_is_invalid() {
        let calculation = Calculation::parse([("x", "[@missing]")], &Locale::english()).unwrap();
        assert!(calculation.apply(&people()[0]).get("x").unwrap().is_invalid());
    }

    #[test]
    fn test_apply_all() {
        let calculation = Calculation::parse([("initial", "LEFT([@first],1)")], &Locale::english()).unwrap();
        let future = calculation.apply_all(Arc::new(people()));
        let (tx, rx) = mpsc::channel();
        let job = future.get(None, move |rows: Fallible<Vec<Row>>| tx.send(rows).unwrap());
        let rows = rx.recv_timeout(Duration::from_secs(5)).unwrap().require();
        let initials: Vec<_> = rows.iter().map(|r| r.get("initial").cloned().unwrap()).collect();
        assert_eq!(initials, vec![Value::from("J"), Value::from("A")]);
        assert_eq!(job.progress(), 1.0);
    }

    #[test]
    fn test_apply_all_keeps_row_order_across_chunks() {
        let rows: Vec<Row> = (0..CHUNK_SIZE as i64 * 3 + 5)
            .map(|n| Row::from_pairs([("n", n)]).unwrap())
            .collect();
        let calculation = Calculation::parse([("double", "[@n]*2")], &Locale::english()).unwrap();
        let (tx, rx) = mpsc::channel();
        let job = calculation
            .apply_all(Arc::new(rows.clone()))
            .get(None, move |rows: Fallible<Vec<Row>>| tx.send(rows).unwrap());
        let out = rx.recv_timeout(Duration::from_secs(5)).unwrap().require();
        assert_eq!(out.len(), rows.len());
        for (n, row) in out.iter().enumerate() {
            assert_eq!(row.get("double"), Some(&Value::Int(n as i64 * 2)));
        }
        assert_eq!(job.progress(), 1.0);
    }

    #[test]
    fn test_apply_all_under_cancelled_job_does_not_run() {
        let parent = qbe_engine::Job::new(qbe_engine::QoS::Background);
        parent.cancel();
        let calculation = Calculation::parse([("x", "1")], &Locale::english()).unwrap();
        let future = calculation.apply_all(Arc::new(people()));
        let (tx, rx) = mpsc::channel();
        future.get(Some(&parent), move |rows: Fallible<Vec<Row>>| tx.send(rows).unwrap());
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!result.is_success());
    }
}
