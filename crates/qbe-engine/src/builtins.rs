//! Built-in functions and binary operators and their metadata.
//!
//! Conventions:
//! - Formula-facing function names are ALL CAPS (e.g. `UPPER`, `SPLIT`).
//! - Every function has exactly one entry in `FUNCTIONS`; its position there fixes
//!   the order in which the inference search tries unary functions.
//! - If you add a function, add the variant, its `FUNCTIONS` entry and a branch in
//!   `Function::apply`.
//!
//! Coercion table shared by all operators:
//! - `Invalid` in, `Invalid` out.
//! - Arithmetic and comparisons need numeric operands (`Value::as_f64`); `Empty` is not
//!   numeric, so `Empty + 1` is `Invalid`.
//! - Text operators use `Value::as_string`, where `Empty` reads as `""`.

use rand::Rng;
use regex::RegexBuilder;

use crate::engine::{Language, Locale, Value};

/// How many arguments a function accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Between(usize, usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn valid(&self, count: usize) -> bool {
        match *self {
            Arity::Fixed(n) => count == n,
            Arity::Between(min, max) => count >= min && count <= max,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        }
    }
}

/// The closed set of named functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Identity,
    Negate,
    Absolute,
    Sqrt,
    Round,
    Upper,
    Lower,
    Trim,
    Capitalize,
    Length,
    Left,
    Right,
    Mid,
    Substitute,
    Split,
    Nth,
    Items,
    Concat,
    Sum,
    Average,
    Min,
    Max,
    Count,
    And,
    Or,
    Xor,
    Not,
    If,
    Random,
    Now,
}

pub struct FunctionInfo {
    pub function: Function,
    pub sheet_name: &'static str,
    pub dutch_name: &'static str,
    pub arity: Arity,
    pub deterministic: bool,
    pub description: &'static str,
}

const fn info(
    function: Function,
    sheet_name: &'static str,
    dutch_name: &'static str,
    arity: Arity,
    deterministic: bool,
    description: &'static str,
) -> FunctionInfo {
    FunctionInfo {
        function,
        sheet_name,
        dutch_name,
        arity,
        deterministic,
        description,
    }
}

pub const FUNCTIONS: &[FunctionInfo] = &[
    info(Function::Identity, "IDENTITY", "IDENTITEIT", Arity::Fixed(1), true, "The argument itself"),
    info(Function::Negate, "NEGATE", "NEGATIE", Arity::Fixed(1), true, "Negated number"),
    info(Function::Absolute, "ABS", "ABS", Arity::Fixed(1), true, "Absolute value"),
    info(Function::Sqrt, "SQRT", "WORTEL", Arity::Fixed(1), true, "Square root"),
    info(Function::Round, "ROUND", "AFRONDEN", Arity::Between(1, 2), true, "Round to a number of decimals"),
    info(Function::Upper, "UPPER", "HOOFDLETTERS", Arity::Fixed(1), true, "Text in upper case"),
    info(Function::Lower, "LOWER", "KLEINE.LETTERS", Arity::Fixed(1), true, "Text in lower case"),
    info(Function::Trim, "TRIM", "SPATIES.WISSEN", Arity::Fixed(1), true, "Text without surrounding whitespace"),
    info(Function::Capitalize, "PROPER", "BEGINLETTERS", Arity::Fixed(1), true, "Each word capitalized"),
    info(Function::Length, "LEN", "LENGTE", Arity::Fixed(1), true, "Number of characters"),
    info(Function::Left, "LEFT", "LINKS", Arity::Fixed(2), true, "First n characters"),
    info(Function::Right, "RIGHT", "RECHTS", Arity::Fixed(2), true, "Last n characters"),
    info(Function::Mid, "MID", "DEEL", Arity::Fixed(3), true, "n characters from a 0-based offset"),
    info(Function::Substitute, "SUBSTITUTE", "SUBSTITUEREN", Arity::Fixed(3), true, "Replace all occurrences"),
    info(Function::Split, "SPLIT", "SPLITS", Arity::Fixed(2), true, "Split text into a pack"),
    info(Function::Nth, "NTH", "NDE", Arity::Fixed(2), true, "1-based item of a pack"),
    info(Function::Items, "ITEMS", "ITEMS", Arity::Fixed(1), true, "Number of items in a pack"),
    info(Function::Concat, "CONCAT", "TEKST.SAMENVOEGEN", Arity::Any, true, "Concatenated text"),
    info(Function::Sum, "SUM", "SOM", Arity::AtLeast(1), true, "Sum of numbers"),
    info(Function::Average, "AVERAGE", "GEMIDDELDE", Arity::AtLeast(1), true, "Mean of numbers"),
    info(Function::Min, "MIN", "MIN", Arity::AtLeast(1), true, "Smallest number"),
    info(Function::Max, "MAX", "MAX", Arity::AtLeast(1), true, "Largest number"),
    info(Function::Count, "COUNT", "AANTAL", Arity::Any, true, "Number of numeric arguments"),
    info(Function::And, "AND", "EN", Arity::AtLeast(1), true, "True if all are true"),
    info(Function::Or, "OR", "OF", Arity::AtLeast(1), true, "True if any is true"),
    info(Function::Xor, "XOR", "EX.OF", Arity::Fixed(2), true, "True if exactly one is true"),
    info(Function::Not, "NOT", "NIET", Arity::Fixed(1), true, "Negated boolean"),
    info(Function::If, "IF", "ALS", Arity::Fixed(3), true, "Choose by condition"),
    info(Function::Random, "RANDOM", "ASELECT", Arity::Fixed(0), false, "Random number in [0, 1)"),
    info(Function::Now, "NOW", "NU", Arity::Fixed(0), false, "Current time as UNIX seconds"),
];

impl Function {
    /// Every function, in registry order.
    pub fn all() -> impl Iterator<Item = Function> {
        FUNCTIONS.iter().map(|info| info.function)
    }

    pub fn info(&self) -> &'static FunctionInfo {
        FUNCTIONS
            .iter()
            .find(|info| info.function == *self)
            .unwrap_or(&FUNCTIONS[0])
    }

    pub fn arity(&self) -> Arity {
        self.info().arity
    }

    pub fn is_deterministic(&self) -> bool {
        self.info().deterministic
    }

    /// Formula name of the function in the given locale.
    pub fn name(&self, locale: &Locale) -> &'static str {
        match locale.language {
            Language::En => self.info().sheet_name,
            Language::Nl => self.info().dutch_name,
        }
    }

    pub fn explain(&self, locale: &Locale) -> String {
        self.name(locale).to_lowercase()
    }

    /// Find a function by its (case-insensitive) formula name.
    pub fn from_name(name: &str, locale: &Locale) -> Option<Function> {
        Function::all().find(|f| f.name(locale).eq_ignore_ascii_case(name))
    }

    /// Apply the function to already evaluated arguments. Wrong argument counts give
    /// `Invalid`.
    pub fn apply(&self, args: &[Value]) -> Value {
        if !self.arity().valid(args.len()) {
            return Value::Invalid;
        }

        match self {
            Function::Identity => args[0].clone(),
            Function::Negate => match &args[0] {
                Value::Int(i) => i.checked_neg().map(Value::Int).unwrap_or(Value::Invalid),
                other => numeric(other, |n| -n),
            },
            Function::Absolute => match &args[0] {
                Value::Int(i) => i.checked_abs().map(Value::Int).unwrap_or(Value::Invalid),
                other => numeric(other, f64::abs),
            },
            Function::Sqrt => match args[0].as_f64() {
                Some(n) if n >= 0.0 => Value::double(n.sqrt()),
                _ => Value::Invalid,
            },
            Function::Round => {
                let Some(n) = args[0].as_f64() else {
                    return Value::Invalid;
                };
                let decimals = match args.get(1) {
                    Some(d) => match d.as_i64() {
                        Some(d) if (0..=12).contains(&d) => d as i32,
                        _ => return Value::Invalid,
                    },
                    None => 0,
                };
                let factor = 10f64.powi(decimals);
                Value::double((n * factor).round() / factor)
            }
            Function::Upper => text(&args[0], |s| s.to_uppercase()),
            Function::Lower => text(&args[0], |s| s.to_lowercase()),
            Function::Trim => text(&args[0], |s| s.trim().to_string()),
            Function::Capitalize => text(&args[0], capitalize),
            Function::Length => match args[0].as_string() {
                Some(s) => Value::from(s.chars().count()),
                None => Value::Invalid,
            },
            Function::Left => match (args[0].as_string(), count_arg(&args[1])) {
                (Some(s), Some(n)) => Value::String(s.chars().take(n).collect()),
                _ => Value::Invalid,
            },
            Function::Right => match (args[0].as_string(), count_arg(&args[1])) {
                (Some(s), Some(n)) => {
                    let len = s.chars().count();
                    Value::String(s.chars().skip(len.saturating_sub(n)).collect())
                }
                _ => Value::Invalid,
            },
            Function::Mid => match (args[0].as_string(), count_arg(&args[1]), count_arg(&args[2])) {
                (Some(s), Some(start), Some(len)) => {
                    Value::String(s.chars().skip(start).take(len).collect())
                }
                _ => Value::Invalid,
            },
            Function::Substitute => match (
                args[0].as_string(),
                args[1].as_string(),
                args[2].as_string(),
            ) {
                (Some(s), Some(find), Some(replace)) => {
                    if find.is_empty() {
                        Value::String(s)
                    } else {
                        Value::String(s.replace(&find, &replace))
                    }
                }
                _ => Value::Invalid,
            },
            Function::Split => match (args[0].as_string(), args[1].as_string()) {
                (Some(s), Some(separator)) if !separator.is_empty() => {
                    Value::String(pack_encode(s.split(separator.as_str())))
                }
                _ => Value::Invalid,
            },
            Function::Nth => match (args[0].as_string(), args[1].as_i64()) {
                (Some(pack), Some(index)) if index >= 1 => pack_decode(&pack)
                    .into_iter()
                    .nth((index - 1) as usize)
                    .map(Value::String)
                    .unwrap_or(Value::Invalid),
                _ => Value::Invalid,
            },
            Function::Items => match args[0].as_string() {
                Some(pack) => Value::from(pack_decode(&pack).len()),
                None => Value::Invalid,
            },
            Function::Concat => {
                let mut out = String::new();
                for arg in args {
                    match arg.as_string() {
                        Some(s) => out.push_str(&s),
                        None => return Value::Invalid,
                    }
                }
                Value::String(out)
            }
            Function::Sum => fold_numbers(args, |acc, n| acc + n),
            Function::Average => match fold_numbers(args, |acc, n| acc + n).as_f64() {
                Some(total) => Value::double(total / args.len() as f64),
                None => Value::Invalid,
            },
            Function::Min => reduce_numbers(args, f64::min),
            Function::Max => reduce_numbers(args, f64::max),
            Function::Count => {
                if args.iter().any(Value::is_invalid) {
                    return Value::Invalid;
                }
                Value::from(args.iter().filter(|v| v.as_f64().is_some()).count())
            }
            Function::And => logical(args, |bools| bools.iter().all(|b| *b)),
            Function::Or => logical(args, |bools| bools.iter().any(|b| *b)),
            Function::Xor => logical(args, |bools| bools[0] != bools[1]),
            Function::Not => match args[0].as_bool() {
                Some(b) => Value::Bool(!b),
                None => Value::Invalid,
            },
            Function::If => match args[0].as_bool() {
                Some(true) => args[1].clone(),
                Some(false) => args[2].clone(),
                None => Value::Invalid,
            },
            Function::Random => Value::Double(rand::thread_rng().r#gen::<f64>()),
            Function::Now => {
                let millis = chrono::Utc::now().timestamp_millis();
                Value::double(millis as f64 / 1000.0)
            }
        }
    }
}

/// Binary operators. `apply(lhs, rhs)` takes operands in reading order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binary {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulus,
    Power,
    Concatenation,
    Greater,
    Lesser,
    GreaterEqual,
    LesserEqual,
    Equal,
    NotEqual,
    ContainsString,
    ContainsStringStrict,
    MatchesRegex,
}

impl Binary {
    pub const ALL: [Binary; 16] = [
        Binary::Addition,
        Binary::Subtraction,
        Binary::Multiplication,
        Binary::Division,
        Binary::Modulus,
        Binary::Power,
        Binary::Concatenation,
        Binary::Greater,
        Binary::Lesser,
        Binary::GreaterEqual,
        Binary::LesserEqual,
        Binary::Equal,
        Binary::NotEqual,
        Binary::ContainsString,
        Binary::ContainsStringStrict,
        Binary::MatchesRegex,
    ];

    /// Formula token of the operator. Tokens are the same in every locale.
    pub fn token(&self) -> &'static str {
        match self {
            Binary::Addition => "+",
            Binary::Subtraction => "-",
            Binary::Multiplication => "*",
            Binary::Division => "/",
            Binary::Modulus => "%",
            Binary::Power => "^",
            Binary::Concatenation => "&",
            Binary::Greater => ">",
            Binary::Lesser => "<",
            Binary::GreaterEqual => ">=",
            Binary::LesserEqual => "<=",
            Binary::Equal => "=",
            Binary::NotEqual => "<>",
            Binary::ContainsString => "~=",
            Binary::ContainsStringStrict => "~~=",
            Binary::MatchesRegex => "±=",
        }
    }

    pub fn explain(&self, locale: &Locale) -> &'static str {
        match (locale.language, self) {
            (Language::En, Binary::Addition) => "plus",
            (Language::En, Binary::Subtraction) => "minus",
            (Language::En, Binary::Multiplication) => "times",
            (Language::En, Binary::Division) => "divided by",
            (Language::En, Binary::Modulus) => "modulo",
            (Language::En, Binary::Power) => "to the power of",
            (Language::En, Binary::Concatenation) => "followed by",
            (Language::En, Binary::Greater) => "is greater than",
            (Language::En, Binary::Lesser) => "is less than",
            (Language::En, Binary::GreaterEqual) => "is greater than or equal to",
            (Language::En, Binary::LesserEqual) => "is less than or equal to",
            (Language::En, Binary::Equal) => "is equal to",
            (Language::En, Binary::NotEqual) => "is not equal to",
            (Language::En, Binary::ContainsString) => "contains",
            (Language::En, Binary::ContainsStringStrict) => "contains (case-sensitive)",
            (Language::En, Binary::MatchesRegex) => "matches",
            (Language::Nl, Binary::Addition) => "plus",
            (Language::Nl, Binary::Subtraction) => "min",
            (Language::Nl, Binary::Multiplication) => "maal",
            (Language::Nl, Binary::Division) => "gedeeld door",
            (Language::Nl, Binary::Modulus) => "modulo",
            (Language::Nl, Binary::Power) => "tot de macht",
            (Language::Nl, Binary::Concatenation) => "gevolgd door",
            (Language::Nl, Binary::Greater) => "is groter dan",
            (Language::Nl, Binary::Lesser) => "is kleiner dan",
            (Language::Nl, Binary::GreaterEqual) => "is groter dan of gelijk aan",
            (Language::Nl, Binary::LesserEqual) => "is kleiner dan of gelijk aan",
            (Language::Nl, Binary::Equal) => "is gelijk aan",
            (Language::Nl, Binary::NotEqual) => "is niet gelijk aan",
            (Language::Nl, Binary::ContainsString) => "bevat",
            (Language::Nl, Binary::ContainsStringStrict) => "bevat (hoofdlettergevoelig)",
            (Language::Nl, Binary::MatchesRegex) => "komt overeen met",
        }
    }

    pub fn apply(&self, lhs: &Value, rhs: &Value) -> Value {
        if lhs.is_invalid() || rhs.is_invalid() {
            return Value::Invalid;
        }

        match self {
            Binary::Addition => arithmetic(lhs, rhs, i64::checked_add, |a, b| a + b),
            Binary::Subtraction => arithmetic(lhs, rhs, i64::checked_sub, |a, b| a - b),
            Binary::Multiplication => arithmetic(lhs, rhs, i64::checked_mul, |a, b| a * b),
            Binary::Division => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(_), Some(b)) if b == 0.0 => Value::Invalid,
                (Some(a), Some(b)) => Value::double(a / b),
                _ => Value::Invalid,
            },
            Binary::Modulus => match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => {
                    a.checked_rem(*b).map(Value::Int).unwrap_or(Value::Invalid)
                }
                _ => match (lhs.as_f64(), rhs.as_f64()) {
                    (Some(_), Some(b)) if b == 0.0 => Value::Invalid,
                    (Some(a), Some(b)) => Value::double(a % b),
                    _ => Value::Invalid,
                },
            },
            Binary::Power => match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) if (0..=u32::MAX as i64).contains(b) => a
                    .checked_pow(*b as u32)
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::double((*a as f64).powf(*b as f64))),
                _ => match (lhs.as_f64(), rhs.as_f64()) {
                    (Some(a), Some(b)) => Value::double(a.powf(b)),
                    _ => Value::Invalid,
                },
            },
            Binary::Concatenation => match (lhs.as_string(), rhs.as_string()) {
                (Some(a), Some(b)) => Value::String(a + &b),
                _ => Value::Invalid,
            },
            Binary::Greater => compare(lhs, rhs, |o| o.is_gt()),
            Binary::Lesser => compare(lhs, rhs, |o| o.is_lt()),
            Binary::GreaterEqual => compare(lhs, rhs, |o| o.is_ge()),
            Binary::LesserEqual => compare(lhs, rhs, |o| o.is_le()),
            Binary::Equal => Value::Bool(lhs == rhs),
            Binary::NotEqual => Value::Bool(lhs != rhs),
            Binary::ContainsString => match (lhs.as_string(), rhs.as_string()) {
                (Some(a), Some(b)) => Value::Bool(a.to_lowercase().contains(&b.to_lowercase())),
                _ => Value::Invalid,
            },
            Binary::ContainsStringStrict => match (lhs.as_string(), rhs.as_string()) {
                (Some(a), Some(b)) => Value::Bool(a.contains(&b)),
                _ => Value::Invalid,
            },
            Binary::MatchesRegex => match (lhs.as_string(), rhs.as_string()) {
                (Some(a), Some(pattern)) => {
                    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                        Ok(re) => Value::Bool(re.is_match(&a)),
                        Err(_) => Value::Invalid,
                    }
                }
                _ => Value::Invalid,
            },
        }
    }
}

fn numeric(value: &Value, op: impl Fn(f64) -> f64) -> Value {
    match value.as_f64() {
        Some(n) => Value::double(op(n)),
        None => Value::Invalid,
    }
}

fn text(value: &Value, op: impl Fn(&str) -> String) -> Value {
    match value.as_string() {
        Some(s) => Value::String(op(&s)),
        None => Value::Invalid,
    }
}

fn count_arg(value: &Value) -> Option<usize> {
    value.as_i64().and_then(|n| usize::try_from(n).ok())
}

fn capitalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        if let Some(n) = int_op(*a, *b) {
            return Value::Int(n);
        }
    }
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Value::double(float_op(a, b)),
        _ => Value::Invalid,
    }
}

fn compare(lhs: &Value, rhs: &Value, test: fn(std::cmp::Ordering) -> bool) -> Value {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return match a.partial_cmp(&b) {
            Some(ordering) => Value::Bool(test(ordering)),
            None => Value::Invalid,
        };
    }
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Value::Bool(test(a.cmp(b))),
        _ => Value::Invalid,
    }
}

fn fold_numbers(args: &[Value], op: fn(f64, f64) -> f64) -> Value {
    let mut acc = 0.0;
    for arg in args {
        match arg.as_f64() {
            Some(n) => acc = op(acc, n),
            None => return Value::Invalid,
        }
    }
    Value::number(acc)
}

fn reduce_numbers(args: &[Value], op: fn(f64, f64) -> f64) -> Value {
    let mut acc: Option<f64> = None;
    for arg in args {
        match arg.as_f64() {
            Some(n) => acc = Some(acc.map_or(n, |a| op(a, n))),
            None => return Value::Invalid,
        }
    }
    acc.map(Value::number).unwrap_or(Value::Invalid)
}

fn logical(args: &[Value], op: impl Fn(&[bool]) -> bool) -> Value {
    let mut bools = Vec::with_capacity(args.len());
    for arg in args {
        match arg.as_bool() {
            Some(b) => bools.push(b),
            None => return Value::Invalid,
        }
    }
    Value::Bool(op(&bools))
}

/// Encode items as a pack: `;`-separated, with `$` written as `$0` and `;` as `$1`.
pub fn pack_encode<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|item| item.replace('$', "$0").replace(';', "$1"))
        .collect::<Vec<_>>()
        .join(";")
}

pub fn pack_decode(pack: &str) -> Vec<String> {
    if pack.is_empty() {
        return Vec::new();
    }
    pack.split(';')
        .map(|item| item.replace("$1", ";").replace("$0", "$"))
        .collect()
}
