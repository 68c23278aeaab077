//! Two-case result for asynchronous work.

use std::fmt;

/// The outcome of work delivered through a callback: a value or a failure message.
#[derive(Clone, Debug, PartialEq)]
pub enum Fallible<T> {
    Success(T),
    Failure(String),
}

impl<T> Fallible<T> {
    pub fn failure(message: impl Into<String>) -> Fallible<T> {
        Fallible::Failure(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Fallible::Success(_))
    }

    /// Transform a successful value; failures pass through.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fallible<U> {
        match self {
            Fallible::Success(value) => Fallible::Success(f(value)),
            Fallible::Failure(message) => Fallible::Failure(message),
        }
    }

    /// Chain another fallible step; failures pass through.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Fallible<U>) -> Fallible<U> {
        match self {
            Fallible::Success(value) => f(value),
            Fallible::Failure(message) => Fallible::Failure(message),
        }
    }

    /// Run `f` on success. A failure is logged and otherwise ignored.
    pub fn maybe(self, f: impl FnOnce(T)) {
        match self {
            Fallible::Success(value) => f(value),
            Fallible::Failure(message) => tracing::warn!(%message, "ignoring failure"),
        }
    }

    /// The value, for callers where failure would be a programming error.
    ///
    /// # Panics
    /// Panics with the failure message.
    pub fn require(self) -> T {
        match self {
            Fallible::Success(value) => value,
            Fallible::Failure(message) => panic!("required value missing: {message}"),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Fallible::Success(value) => Ok(value),
            Fallible::Failure(message) => Err(message),
        }
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for Fallible<T> {
    fn from(result: Result<T, E>) -> Fallible<T> {
        match result {
            Ok(value) => Fallible::Success(value),
            Err(err) => Fallible::Failure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chaining_stops_at_failure() {
        let ok: Fallible<i32> = Fallible::Success(2);
        assert_eq!(ok.clone().map(|v| v * 2), Fallible::Success(4));
        assert_eq!(
            ok.and_then(|_| Fallible::<i32>::failure("nope")).map(|v| v + 1),
            Fallible::Failure("nope".to_string())
        );
    }

    #[test]
    fn test_maybe_skips_failure() {
        let mut hit = false;
        Fallible::<i32>::failure("x").maybe(|_| hit = true);
        assert!(!hit);
        Fallible::Success(1).maybe(|_| hit = true);
        assert!(hit);
    }

    #[test]
    fn test_from_result() {
        let parsed: Fallible<i32> = "12".parse::<i32>().into();
        assert_eq!(parsed.into_result(), Ok(12));
        let failed: Fallible<i32> = "x".parse::<i32>().into();
        assert!(!failed.is_success());
    }

    #[test]
    #[should_panic(expected = "required value missing: broken")]
    fn test_require_panics_on_failure() {
        Fallible::<()>::failure("broken").require();
    }
}
