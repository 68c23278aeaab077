//! Atomic cell values.
//!
//! [`Value`] is the closed set of things a cell can hold. Two variants are special:
//! - [`Value::Invalid`] is the absorbing error value. It never compares equal to
//!   anything, not even another `Invalid`.
//! - [`Value::Empty`] means "no value" and is distinct from `Invalid`.
//!
//! Coercions (`as_f64`, `as_string`, ...) follow the rules the operator and function
//! registry relies on; see `builtins` for how each operator treats them.

use std::fmt;

/// A single cell value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    String(String),
    Double(f64),
    Int(i64),
    Bool(bool),
    #[default]
    Empty,
    Invalid,
}

impl Value {
    /// A double value, or `Invalid` when `n` is NaN or infinite.
    pub fn double(n: f64) -> Value {
        if n.is_finite() {
            Value::Double(n)
        } else {
            Value::Invalid
        }
    }

    /// A numeric value that prefers `Int` when `n` is integral and representable.
    pub fn number(n: f64) -> Value {
        if !n.is_finite() {
            return Value::Invalid;
        }
        if n.fract() == 0.0 && n.abs() < 9.0e15 {
            Value::Int(n as i64)
        } else {
            Value::Double(n)
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Numeric view of the value. Strings count when they parse as a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            Value::Empty | Value::Invalid => None,
        }
    }

    /// Integer view of the value. Doubles only count when they have no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => {
                let n = self.as_f64()?;
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Some(n as i64)
                } else {
                    None
                }
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Double(d) => Some(*d != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            Value::Empty | Value::Invalid => None,
        }
    }

    /// String view of the value. Every value except `Invalid` has one; `Empty` is `""`.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Double(d) => Some(d.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Empty => Some(String::new()),
            Value::Invalid => None,
        }
    }

    /// Structural identity: same variant and same payload. Unlike `==`, two `Invalid`
    /// values are identical and `Int(3)` is not identical to `Double(3.0)`.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Empty, Value::Empty) | (Value::Invalid, Value::Invalid) => true,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Invalid, _) | (_, Value::Invalid) => false,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(_), _) | (_, Value::String(_)) => self.as_string() == other.as_string(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Empty, Value::Empty) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Invalid => write!(f, "#INVALID!"),
            other => write!(f, "{}", other.as_string().unwrap_or_default()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::double(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Value {
        i64::try_from(n).map(Value::Int).unwrap_or(Value::Invalid)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}
