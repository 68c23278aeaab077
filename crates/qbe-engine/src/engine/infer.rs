//! Formula inference by example.
//!
//! Given a row, the value of the current cell and a target value, find expressions that
//! evaluate to the target. Each [`Variant`] proposes candidates (`suggest`); the search
//! keeps exact matches, tightens the complexity ceiling as it finds them, and when a
//! variant yields no match it recurses into the near misses with one level less budget.
//!
//! Termination: `level` decreases on every recursion and is never replenished, the
//! complexity ceiling never grows, and a near miss whose value was already seen on the
//! current path is not explored again. Cancellation is checked on entry and before every
//! variant; whatever was accepted so far is returned.

use std::cell::Cell;

use super::expression::{Expression, Variant};
use super::row::Row;
use super::value::Value;
use crate::builtins::{Binary, Function};
use crate::job::Job;

/// Order in which variants are asked for candidates. Among equally complex matches the
/// earlier variant wins the ceiling. `Foreign` never proposes anything and is left out.
pub const SEARCH_ORDER: [Variant; 5] = [
    Variant::Sibling,
    Variant::Literal,
    Variant::Binary,
    Variant::Function,
    Variant::Identity,
];

/// Separators tried when decomposing a string into fields.
pub const SPLIT_SEPARATORS: [&str; 17] = [
    " ", ",", ";", "\t", "|", "-", ".", "/", ":", "\\", "#", "=", "_", "(", ")", "[", "]",
];

/// Search state shared by one inference run: the row, the current cell's value and the
/// cancellation job.
pub struct Inferer<'a> {
    row: &'a Row,
    input: Option<&'a Value>,
    job: Option<&'a Job>,
    suggest_calls: Cell<usize>,
}

impl<'a> Inferer<'a> {
    /// Infer against `row`, taking the current cell to be the value at `column`. An
    /// out-of-range column leaves the current cell unset (`Identity` is `Invalid`).
    pub fn new(row: &'a Row, column: usize, job: Option<&'a Job>) -> Inferer<'a> {
        Inferer::with_input(row, row.value_at(column), job)
    }

    pub fn with_input(row: &'a Row, input: Option<&'a Value>, job: Option<&'a Job>) -> Inferer<'a> {
        Inferer {
            row,
            input,
            job,
            suggest_calls: Cell::new(0),
        }
    }

    /// Number of `suggest` invocations so far.
    pub fn suggest_calls(&self) -> usize {
        self.suggest_calls.get()
    }

    fn cancelled(&self) -> bool {
        self.job.is_some_and(Job::is_cancelled)
    }

    fn evaluate(&self, expression: &Expression) -> Value {
        expression.apply(self.row, None, self.input)
    }

    /// Expressions that turn `from` (or nothing) into `to`, searching `level` levels deep.
    /// Progress is reported to the job after each variant.
    pub fn infer(&self, from: Option<&Expression>, to: &Value, level: usize) -> Vec<Expression> {
        let found = self.search(from, to, level, usize::MAX, &[], true);
        tracing::debug!(
            level,
            suggest_calls = self.suggest_calls(),
            results = found.len(),
            cancelled = self.cancelled(),
            "inference finished"
        );
        found
    }

    /// One search step. Candidates at or above `max_complexity` are pruned; `previous`
    /// holds the intermediate values already explored on this path.
    pub fn infer_bounded(
        &self,
        from: Option<&Expression>,
        to: &Value,
        level: usize,
        max_complexity: usize,
        previous: &[Value],
    ) -> Vec<Expression> {
        self.search(from, to, level, max_complexity, previous, false)
    }

    fn search(
        &self,
        from: Option<&Expression>,
        to: &Value,
        level: usize,
        max_complexity: usize,
        previous: &[Value],
        report: bool,
    ) -> Vec<Expression> {
        let mut found = Vec::new();
        if self.cancelled() {
            return found;
        }

        let mut best = max_complexity;
        for (done, variant) in SEARCH_ORDER.into_iter().enumerate() {
            if report && done > 0 {
                self.report_progress(done);
            }
            if self.cancelled() {
                break;
            }

            let mut near_misses = Vec::new();
            for candidate in self.suggest(variant, from, to, level) {
                let complexity = candidate.complexity();
                if complexity >= best {
                    continue;
                }
                let value = self.evaluate(&candidate);
                if value == *to {
                    best = complexity;
                    found.push(candidate);
                } else if level > 0 {
                    near_misses.push((candidate, value));
                }
            }

            if !found.is_empty() {
                continue;
            }

            for (candidate, value) in near_misses {
                if self.cancelled() {
                    break;
                }
                if previous.iter().any(|seen| *seen == value) {
                    continue;
                }
                let mut path = previous.to_vec();
                path.push(value);

                for deeper in self.infer_bounded(Some(&candidate), to, level - 1, best, &path) {
                    let complexity = deeper.complexity();
                    if complexity <= best {
                        best = complexity;
                        found.push(deeper);
                    }
                }
            }
        }

        if report && !self.cancelled() {
            self.report_progress(SEARCH_ORDER.len());
        }
        found
    }

    fn report_progress(&self, variants_done: usize) {
        if let Some(job) = self.job {
            job.report_progress(variants_done as f64 / SEARCH_ORDER.len() as f64, job.id());
        }
    }

    /// Candidates of one variant that move `from` toward `to`.
    pub fn suggest(
        &self,
        variant: Variant,
        from: Option<&Expression>,
        to: &Value,
        level: usize,
    ) -> Vec<Expression> {
        self.suggest_calls.set(self.suggest_calls.get() + 1);
        match variant {
            Variant::Literal => match from {
                None => vec![Expression::Literal(to.clone())],
                Some(_) => Vec::new(),
            },
            Variant::Sibling => match from {
                None => self
                    .row
                    .columns()
                    .iter()
                    .map(|column| Expression::Sibling(column.clone()))
                    .collect(),
                Some(_) => Vec::new(),
            },
            Variant::Identity | Variant::Foreign => Vec::new(),
            Variant::Binary => match from {
                Some(from) if level > 0 => self.suggest_binary(from, to, level),
                _ => Vec::new(),
            },
            Variant::Function => match from {
                Some(from) => self.suggest_function(from, to),
                None => Vec::new(),
            },
        }
    }

    fn suggest_binary(&self, from: &Expression, to: &Value, level: usize) -> Vec<Expression> {
        let f = self.evaluate(from);
        let mut suggestions = Vec::new();
        let seen = [to.clone(), f.clone()];

        if let (Some(target), Some(source)) = (to.as_f64(), f.as_f64()) {
            let difference = target - source;
            if difference != 0.0 {
                let op = if difference > 0.0 {
                    Binary::Addition
                } else {
                    Binary::Subtraction
                };
                let operand = Value::number(difference.abs());
                for found in self.infer_bounded(None, &operand, level - 1, usize::MAX, &seen) {
                    suggestions.push(Expression::binary(found, from.clone(), op));
                }
            }

            if source != 0.0 {
                let ratio = target / source;
                if ratio != 0.0 && ratio.is_finite() {
                    let (op, factor) = if ratio >= 1.0 {
                        (Binary::Multiplication, ratio)
                    } else {
                        (Binary::Division, 1.0 / ratio)
                    };
                    let operand = Value::number(factor);
                    for found in self.infer_bounded(None, &operand, level - 1, usize::MAX, &seen) {
                        suggestions.push(Expression::binary(found, from.clone(), op));
                    }
                }
            }
        } else if let (Some(target), Some(source)) = (to.as_string(), f.as_string()) {
            if !source.is_empty() && source.chars().count() < target.chars().count() {
                if let Some(suffix) = target.strip_prefix(source.as_str()) {
                    let rest = Value::from(suffix);
                    for found in self.infer_bounded(None, &rest, level - 1, usize::MAX, &seen) {
                        suggestions.push(Expression::binary(found, from.clone(), Binary::Concatenation));
                    }
                }
                if let Some(prefix) = target.strip_suffix(source.as_str()) {
                    let rest = Value::from(prefix);
                    for found in self.infer_bounded(None, &rest, level - 1, usize::MAX, &seen) {
                        suggestions.push(Expression::binary(from.clone(), found, Binary::Concatenation));
                    }
                }
            }
        }

        suggestions
    }

    fn suggest_function(&self, from: &Expression, to: &Value) -> Vec<Expression> {
        let f = self.evaluate(from);
        let mut suggestions = Vec::new();

        for function in Function::all() {
            if function.is_deterministic()
                && function.arity().valid(1)
                && function.apply(std::slice::from_ref(&f)) == *to
            {
                suggestions.push(Expression::call(function, vec![from.clone()]));
            }
        }

        let (Some(source), Some(target)) = (f.as_string(), to.as_string()) else {
            return suggestions;
        };

        // Fields of the source split on a common separator; near misses are kept as a
        // fallback for the caller's deeper search.
        let mut incomplete = Vec::new();
        let mut found_as_element = false;
        for separator in SPLIT_SEPARATORS {
            if self.cancelled() {
                break;
            }
            let fields: Vec<&str> = source.split(separator).collect();
            if fields.len() < 2 {
                continue;
            }
            for (i, field) in fields.iter().enumerate() {
                let nth = Expression::call(
                    Function::Nth,
                    vec![
                        Expression::call(
                            Function::Split,
                            vec![from.clone(), Expression::literal(separator)],
                        ),
                        Expression::literal(i as i64 + 1),
                    ],
                );
                if Value::from(*field) == *to {
                    suggestions.push(nth);
                    found_as_element = true;
                } else {
                    incomplete.push(nth);
                }
            }
        }

        if !found_as_element {
            if !incomplete.is_empty() {
                suggestions.extend(incomplete);
            } else if !target.is_empty() {
                if let Some(byte_offset) = source.find(target.as_str()) {
                    let offset = source[..byte_offset].chars().count() as i64;
                    let length = target.chars().count() as i64;
                    suggestions.push(Expression::call(
                        Function::Left,
                        vec![from.clone(), Expression::literal(length)],
                    ));
                    suggestions.push(Expression::call(
                        Function::Right,
                        vec![from.clone(), Expression::literal(length)],
                    ));
                    suggestions.push(Expression::call(
                        Function::Mid,
                        vec![
                            from.clone(),
                            Expression::literal(offset),
                            Expression::literal(length),
                        ],
                    ));
                }
            }
        }

        suggestions
    }
}

impl Variant {
    /// Candidates of this variant moving `from` toward `to`. See [`Inferer::suggest`].
    pub fn suggest(
        &self,
        from: Option<&Expression>,
        to: &Value,
        row: &Row,
        input: Option<&Value>,
        level: usize,
        job: Option<&Job>,
    ) -> Vec<Expression> {
        Inferer::with_input(row, input, job).suggest(*self, from, to, level)
    }
}

/// Infer expressions producing `to` from the value of `row` at `column`.
pub fn infer(
    from: Option<&Expression>,
    to: &Value,
    row: &Row,
    column: usize,
    level: usize,
    job: Option<&Job>,
) -> Vec<Expression> {
    Inferer::new(row, column, job).infer(from, to, level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Locale;
    use crate::queue::QoS;

    fn people() -> Row {
        Row::from_pairs([("first", "John"), ("last", "Doe")]).unwrap()
    }

    fn formulas(found: &[Expression]) -> Vec<String> {
        found.iter().map(|e| e.to_formula(&Locale::english())).collect()
    }

    #[test]
    fn test_literal_and_sibling_base_cases() {
        let row = people();
        let literal = Variant::Literal.suggest(None, &Value::from("x"), &row, None, 0, None);
        assert_eq!(formulas(&literal), vec!["\"x\""]);

        let siblings = Variant::Sibling.suggest(None, &Value::from("x"), &row, None, 0, None);
        assert_eq!(formulas(&siblings), vec!["[@first]", "[@last]"]);

        let from = Expression::sibling("first");
        assert!(Variant::Sibling.suggest(Some(&from), &Value::from("x"), &row, None, 2, None).is_empty());
        assert!(Variant::Identity.suggest(None, &Value::from("x"), &row, None, 2, None).is_empty());
    }

    #[test]
    fn test_sibling_copy_wins_over_literal() {
        let row = people();
        let found = infer(None, &Value::from("Doe"), &row, 0, 2, None);
        assert_eq!(formulas(&found), vec!["[@last]"]);
    }

    #[test]
    fn test_unary_function_match() {
        let row = people();
        let from = Expression::sibling("first");
        let found = infer(Some(&from), &Value::from("JOHN"), &row, 0, 1, None);
        assert_eq!(formulas(&found), vec!["UPPER([@first])"]);
    }

    #[test]
    fn test_numeric_multiplication() {
        let row = Row::from_pairs([("n", 3i64)]).unwrap();
        let from = Expression::sibling("n");
        let found = Variant::Binary.suggest(Some(&from), &Value::Int(9), &row, None, 1, None);
        let multiplications: Vec<_> = found
            .iter()
            .filter(|e| matches!(e, Expression::Binary { op: Binary::Multiplication, .. }))
            .collect();
        assert!(!multiplications.is_empty());
        for e in multiplications {
            assert_eq!(e.apply(&row, None, None), Value::Int(9));
        }
        // At level 0 there is no budget for the nested operand search.
        assert!(Variant::Binary.suggest(Some(&from), &Value::Int(9), &row, None, 0, None).is_empty());
    }

    #[test]
    fn test_numeric_addition_and_division() {
        let row = Row::from_pairs([("n", Value::Int(8)), ("other", Value::from("x"))]).unwrap();
        let from = Expression::sibling("n");

        let added = infer(Some(&from), &Value::Int(13), &row, 1, 1, None);
        assert_eq!(formulas(&added), vec!["([@n]+5)"]);

        // Subtraction and division tie on complexity; the earlier candidate wins.
        let halved = infer(Some(&from), &Value::Int(4), &row, 1, 1, None);
        assert_eq!(formulas(&halved), vec!["([@n]-4)"]);
        let proposed = Variant::Binary.suggest(Some(&from), &Value::Int(4), &row, None, 1, None);
        assert_eq!(formulas(&proposed), vec!["([@n]-4)", "([@n]/2)"]);
    }

    #[test]
    fn test_numbers_are_not_concatenated() {
        let row = Row::from_pairs([("n", 1i64)]).unwrap();
        let from = Expression::sibling("n");
        let found = Variant::Binary.suggest(Some(&from), &Value::Int(12), &row, None, 1, None);
        assert!(!found.is_empty());
        for e in &found {
            assert!(!matches!(e, Expression::Binary { op: Binary::Concatenation, .. }));
            assert_eq!(e.apply(&row, None, None), Value::Int(12));
        }
    }

    #[test]
    fn test_split_field() {
        let row = Row::from_pairs([("date", "2024-05-17")]).unwrap();
        let from = Expression::sibling("date");
        let found = infer(Some(&from), &Value::from("05"), &row, 0, 1, None);
        assert_eq!(formulas(&found), vec!["NTH(SPLIT([@date],\"-\"),2)"]);
    }

    #[test]
    fn test_incomplete_splits_are_proposed() {
        let row = Row::from_pairs([("s", "ab cd")]).unwrap();
        let from = Expression::sibling("s");
        let proposed = Variant::Function.suggest(Some(&from), &Value::from("c"), &row, None, 0, None);
        assert_eq!(
            formulas(&proposed),
            vec!["NTH(SPLIT([@s],\" \"),1)", "NTH(SPLIT([@s],\" \"),2)"]
        );
    }

    #[test]
    fn test_unary_match_keeps_split_candidates() {
        let row = Row::from_pairs([("s", "ab cd")]).unwrap();
        let from = Expression::sibling("s");
        let proposed = Variant::Function.suggest(Some(&from), &Value::from("AB CD"), &row, None, 0, None);
        let texts = formulas(&proposed);
        assert!(texts.contains(&"UPPER([@s])".to_string()), "{texts:?}");
        assert!(texts.contains(&"NTH(SPLIT([@s],\" \"),1)".to_string()), "{texts:?}");
        assert!(texts.contains(&"NTH(SPLIT([@s],\" \"),2)".to_string()), "{texts:?}");
    }

    #[test]
    fn test_substring_fallback() {
        let row = Row::from_pairs([("code", "XY123Z")]).unwrap();
        let from = Expression::sibling("code");
        let proposed = Variant::Function.suggest(Some(&from), &Value::from("123"), &row, None, 0, None);
        assert_eq!(
            formulas(&proposed),
            vec!["LEFT([@code],3)", "RIGHT([@code],3)", "MID([@code],2,3)"]
        );

        let found = infer(Some(&from), &Value::from("123"), &row, 0, 1, None);
        assert_eq!(formulas(&found), vec!["MID([@code],2,3)"]);
    }

    #[test]
    fn test_unary_match_keeps_substring_candidates() {
        let row = Row::from_pairs([("s", "abc")]).unwrap();
        let from = Expression::sibling("s");
        let proposed = Variant::Function.suggest(Some(&from), &Value::from("abc"), &row, None, 0, None);
        let texts = formulas(&proposed);
        assert!(texts.contains(&"LOWER([@s])".to_string()), "{texts:?}");
        for expected in ["LEFT([@s],3)", "RIGHT([@s],3)", "MID([@s],0,3)"] {
            assert!(texts.contains(&expected.to_string()), "{texts:?}");
        }
    }

    #[test]
    fn test_concatenation_with_prefix_and_suffix() {
        let row = people();
        let from = Expression::sibling("first");
        let found = infer(Some(&from), &Value::from("John Doe"), &row, 0, 3, None);
        let texts = formulas(&found);
        assert!(texts.contains(&"([@first]&(\" \"&[@last]))".to_string()));
        assert!(texts.contains(&"([@first]&\" Doe\")".to_string()));

        let found = infer(Some(&from), &Value::from("Mr John"), &row, 0, 1, None);
        assert_eq!(formulas(&found), vec!["(\"Mr \"&[@first])"]);
    }

    #[test]
    fn test_identity_input() {
        let row = Row::from_pairs([("a", "x")]).unwrap();
        let input = Value::from("hello");
        let inferer = Inferer::with_input(&row, Some(&input), None);
        let found = inferer.infer(Some(&Expression::Identity), &Value::from("HELLO"), 1);
        assert_eq!(formulas(&found), vec!["UPPER(RC)"]);
    }

    #[test]
    fn test_cancelled_job_returns_nothing() {
        let job = Job::new(QoS::UserInitiated);
        job.cancel();
        let row = people();
        let inferer = Inferer::new(&row, 0, Some(&job));
        assert!(inferer.infer(None, &Value::from("John Doe"), 5).is_empty());
        assert_eq!(inferer.suggest_calls(), 0);
    }

    #[test]
    fn test_cancel_mid_search_keeps_accepted_results() {
        let row = people();
        let target = Value::from("John Doe");
        let complete = Inferer::new(&row, 0, None);
        let all = formulas(&complete.infer(None, &target, 3));
        assert!(all.contains(&"\"John Doe\"".to_string()), "{all:?}");

        // Cancel as soon as the first variant has been searched.
        let job = Job::new(QoS::UserInitiated);
        job.observe(|job: &Job, _| job.cancel());
        let inferer = Inferer::new(&row, 0, Some(&job));
        let partial = inferer.infer(None, &target, 3);

        assert!(job.is_cancelled());
        assert!(!partial.is_empty());
        for e in &partial {
            assert!(!matches!(e, Expression::Literal(_)), "{e:?}");
            assert_eq!(e.apply(&row, None, row.value_at(0)), target);
        }
        assert!(inferer.suggest_calls() < complete.suggest_calls());
    }

    #[test]
    fn test_infer_reports_progress() {
        let job = Job::new(QoS::UserInitiated);
        let row = people();
        Inferer::new(&row, 0, Some(&job)).infer(None, &Value::from("Doe"), 1);
        assert_eq!(job.progress(), 1.0);
    }

    #[test]
    fn test_no_result_is_empty() {
        let row = Row::from_pairs([("n", 0i64)]).unwrap();
        let from = Expression::sibling("n");
        let found = infer(Some(&from), &Value::from("zzz"), &row, 0, 2, None);
        assert!(found.is_empty());
    }
}
