//! Formula suggestions for a cell.
//!
//! A [`Suggester`] runs the inference search for one cell under a time-limited
//! [`Future`], then keeps the formulas that also hold for every extra example.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use qbe_engine::engine::{Column, Expression, Inferer, Locale, Row, Value};
use qbe_engine::{Batch, Future};

use crate::config::Config;

/// What the user typed: `target` is the desired value of `column` in `row`.
#[derive(Clone, Debug)]
pub struct SuggestionRequest {
    pub row: Row,
    pub column: Column,
    pub target: Value,
    /// Other rows with the value the formula must produce for them.
    pub examples: Vec<(Row, Value)>,
}

impl SuggestionRequest {
    pub fn new(row: Row, column: impl Into<Column>, target: impl Into<Value>) -> Self {
        SuggestionRequest {
            row,
            column: column.into(),
            target: target.into(),
            examples: Vec::new(),
        }
    }

    pub fn with_example(mut self, row: Row, target: impl Into<Value>) -> Self {
        self.examples.push((row, target.into()));
        self
    }

    /// True if `expression` produces the target for the request row and every example.
    pub fn holds_for(&self, expression: &Expression) -> bool {
        let produces = |row: &Row, target: &Value| {
            expression.apply(row, None, row.get(&self.column)) == *target
        };
        produces(&self.row, &self.target)
            && self
                .examples
                .iter()
                .all(|(row, target)| produces(row, target))
    }
}

#[derive(Clone, Debug)]
pub struct Suggestion {
    pub expression: Expression,
    pub formula: String,
    pub explanation: String,
    pub complexity: usize,
}

pub type SuggestionFuture = Arc<Future<Vec<Suggestion>>>;

pub struct Suggester {
    config: Config,
    current: Mutex<Option<SuggestionFuture>>,
}

impl Suggester {
    pub fn new(config: Config) -> Suggester {
        Suggester {
            config,
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start suggesting for `request`. The search begins on the first `get` of the
    /// returned future. A request still in flight from an earlier call is cancelled.
    pub fn suggest(&self, request: SuggestionRequest) -> SuggestionFuture {
        let request = Arc::new(request);
        let level = self.config.level;
        let max = self.config.max_suggestions;
        let locale = self.config.locale();

        let future = Arc::new(
            Future::new(move |batch: Batch<Vec<Suggestion>>| {
                let request = request.clone();
                let worker = batch.clone();
                let scheduled = batch.job().spawn(move || {
                    let job = worker.job();
                    let input = request.row.get(&request.column);
                    let inferer = Inferer::with_input(&request.row, input, Some(job));
                    let found = job
                        .time("infer", || inferer.infer(None, &request.target, level))
                        .unwrap_or_default();
                    worker.satisfy(rank(found, &request, &locale, max));
                });
                if !scheduled {
                    batch.satisfy(Vec::new());
                }
            })
            .with_time_limit(self.config.time_limit()),
        );

        let previous = match self.current.lock() {
            Ok(mut current) => current.replace(future.clone()),
            Err(poisoned) => poisoned.into_inner().replace(future.clone()),
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        future
    }
}

/// Verified, deduplicated suggestions, simplest first.
fn rank(
    found: Vec<Expression>,
    request: &SuggestionRequest,
    locale: &Locale,
    max: usize,
) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    let mut suggestions = Vec::new();
    for expression in found {
        if !request.holds_for(&expression) {
            continue;
        }
        let formula = expression.to_formula(locale);
        if !seen.insert(formula.clone()) {
            continue;
        }
        suggestions.push(Suggestion {
            explanation: expression.explain(locale),
            complexity: expression.complexity(),
            formula,
            expression,
        });
    }
    suggestions.sort_by_key(|s| s.complexity);
    suggestions.truncate(max);
    tracing::debug!(suggestions = suggestions.len(), "ranked suggestions");
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbe_engine::{Job, QoS};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    fn person(first: &str, last: &str) -> Row {
        Row::from_pairs([
            ("first", Value::from(first)),
            ("last", Value::from(last)),
            ("full", Value::Empty),
        ])
        .unwrap()
    }

    fn config(level: usize) -> Config {
        Config {
            level,
            time_limit: 10.0,
            ..Config::default()
        }
    }

    fn wait(future: &SuggestionFuture) -> Vec<Suggestion> {
        let (tx, rx) = mpsc::channel();
        future.get(None, move |s| tx.send(s).unwrap());
        rx.recv_timeout(WAIT).unwrap()
    }

    #[test]
    fn test_single_example_includes_constant() {
        let suggester = Suggester::new(config(1));
        let request = SuggestionRequest::new(person("John", "Doe"), "full", "John Doe");
        let suggestions = wait(&suggester.suggest(request));
        assert_eq!(suggestions[0].formula, "\"John Doe\"");
        assert!(suggestions.windows(2).all(|w| w[0].complexity <= w[1].complexity));
    }

    #[test]
    fn test_examples_filter_out_constants() {
        let suggester = Suggester::new(config(4));
        let request = SuggestionRequest::new(person("John", "Doe"), "full", "John Doe")
            .with_example(person("Ann", "Roe"), "Ann Roe");
        let suggestions = wait(&suggester.suggest(request.clone()));

        assert!(!suggestions.is_empty());
        for suggestion in &suggestions {
            assert!(!matches!(suggestion.expression, Expression::Literal(_)));
            assert!(request.holds_for(&suggestion.expression));
            assert!(suggestion.formula.contains("[@last]"), "{}", suggestion.formula);
        }
    }

    #[test]
    fn test_number_suggestion_uses_sibling() {
        let suggester = Suggester::new(config(2));
        let row = Row::from_pairs([("n", Value::Int(3)), ("out", Value::Empty)]).unwrap();
        let other = Row::from_pairs([("n", Value::Int(5)), ("out", Value::Empty)]).unwrap();
        let request = SuggestionRequest::new(row, "out", 9i64).with_example(other, 11i64);
        let suggestions = wait(&suggester.suggest(request));
        let formulas: Vec<&str> = suggestions.iter().map(|s| s.formula.as_str()).collect();
        assert!(formulas.contains(&"([@n]+6)"), "{formulas:?}");
    }

    #[test]
    fn test_max_suggestions_truncates() {
        let suggester = Suggester::new(Config {
            max_suggestions: 1,
            ..config(2)
        });
        let request = SuggestionRequest::new(person("John", "Doe"), "full", "John Doe");
        assert_eq!(wait(&suggester.suggest(request)).len(), 1);
    }

    #[test]
    fn test_unreachable_target_gives_nothing() {
        let suggester = Suggester::new(config(2));
        let request = SuggestionRequest::new(person("John", "Doe"), "full", "zzz")
            .with_example(person("Ann", "Roe"), "yyy");
        assert!(wait(&suggester.suggest(request)).is_empty());
    }

    #[test]
    fn test_new_request_cancels_previous() {
        let suggester = Suggester::new(config(4));
        let first = suggester.suggest(SuggestionRequest::new(person("John", "Doe"), "full", "John Doe"));

        // Hold the first search after its first variant until the second request is in.
        let (reached_tx, reached_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let gate = Mutex::new(Some((reached_tx, release_rx)));
        let parent = Job::new(QoS::UserInitiated);
        parent.observe(move |_: &Job, _| {
            if let Some((reached, release)) = gate.lock().unwrap().take() {
                reached.send(()).unwrap();
                release.recv().unwrap();
            }
        });

        let (tx, rx) = mpsc::channel();
        first.get(Some(&parent), move |s| tx.send(s).unwrap());
        reached_rx.recv_timeout(WAIT).unwrap();

        let second = suggester.suggest(SuggestionRequest::new(person("Ann", "Roe"), "full", "Roe"));
        release_tx.send(()).unwrap();

        assert!(first.is_cancelled());
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert!(!first.is_satisfied());
        assert_eq!(wait(&second)[0].formula, "[@last]");
    }

    #[test]
    fn test_time_limit_delivers_partial_results() {
        let suggester = Suggester::new(Config {
            time_limit: 0.2,
            ..config(3)
        });
        let future = suggester.suggest(SuggestionRequest::new(person("John", "Doe"), "full", "John Doe"));

        // Stall the search after its first variant until the limit has passed.
        let stalled = AtomicBool::new(false);
        let parent = Job::new(QoS::UserInitiated);
        parent.observe(move |_: &Job, _| {
            if !stalled.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_secs(1));
            }
        });

        let (tx, rx) = mpsc::channel();
        let job = future.get(Some(&parent), move |s| tx.send(s).unwrap());
        let suggestions = rx.recv_timeout(WAIT).unwrap();

        assert!(job.is_cancelled());
        assert!(!future.is_cancelled());
        assert!(!suggestions.is_empty());
        let formulas: Vec<&str> = suggestions.iter().map(|s| s.formula.as_str()).collect();
        assert!(!formulas.contains(&"\"John Doe\""), "{formulas:?}");
        assert!(formulas.contains(&"([@first]&\" Doe\")"), "{formulas:?}");
    }

    #[test]
    fn test_explanation_is_localized() {
        let suggester = Suggester::new(Config {
            locale: qbe_engine::engine::Language::Nl,
            ..config(1)
        });
        let request = SuggestionRequest::new(person("John", "Doe"), "full", "JOHN");
        let suggestions = wait(&suggester.suggest(request));
        let upper = suggestions
            .iter()
            .find(|s| s.formula.starts_with("HOOFDLETTERS"))
            .expect("upper case suggestion");
        assert!(!upper.explanation.is_empty());
    }
}
