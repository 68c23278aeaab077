//! Formula text parser.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! comparison := concat (( "=" | "<>" | "<" | ">" | "<=" | ">=" | "~=" | "~~=" | "±=" ) concat)*
//! concat     := additive ("&" additive)*
//! additive   := term (("+" | "-") term)*
//! term       := power (("*" | "/" | "%") power)*
//! power      := unary ("^" power)?
//! unary      := "-" unary | primary
//! primary    := number | string | constant | RC | [@name] | [#name] | NAME(args) | "(" comparison ")"
//! ```
//!
//! Unary minus binds tighter than `^`, so `-2^2` is `4`. Numeric literals always use `.`
//! as decimal separator; the argument separator and constants come from the locale.

use thiserror::Error;

use super::expression::Expression;
use super::locale::Locale;
use super::row::Column;
use super::value::Value;
use crate::builtins::{Binary, Function};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("Unexpected end of formula")]
    UnexpectedEnd,

    #[error("Unexpected '{found}' at position {position}")]
    Unexpected { found: String, position: usize },

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Unterminated column reference starting at position {0}")]
    UnterminatedReference(usize),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("{function} does not accept {count} argument(s)")]
    Arity { function: String, count: usize },

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(String),
    Text(String),
    Ident(String),
    Sibling(String),
    Foreign(String),
    Op(Binary),
    LParen,
    RParen,
    Separator,
}

impl Token {
    fn describe(&self, locale: &Locale) -> String {
        match self {
            Token::Number(n) => n.clone(),
            Token::Text(s) => format!("{q}{s}{q}", q = locale.string_qualifier),
            Token::Ident(s) => s.clone(),
            Token::Sibling(name) => format!("[@{}]", name),
            Token::Foreign(name) => format!("[#{}]", name),
            Token::Op(op) => op.token().to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Separator => locale.argument_separator.to_string(),
        }
    }
}

/// Parse formula text into an expression. A leading `=` is optional.
pub fn parse_formula(text: &str, locale: &Locale) -> Result<Expression, FormulaError> {
    let trimmed = text.trim_start();
    let offset = text.len() - trimmed.len();
    let (body, offset) = match trimmed.strip_prefix('=') {
        Some(rest) => (rest, offset + 1),
        None => (trimmed, offset),
    };

    let tokens = tokenize(body, offset, locale)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        locale,
    };
    let expression = parser.comparison()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expression),
        Some((token, position)) => Err(FormulaError::Unexpected {
            found: token.describe(locale),
            position: *position,
        }),
    }
}

const OPERATORS: &[(&str, Binary)] = &[
    ("~~=", Binary::ContainsStringStrict),
    ("~=", Binary::ContainsString),
    ("±=", Binary::MatchesRegex),
    (">=", Binary::GreaterEqual),
    ("<=", Binary::LesserEqual),
    ("<>", Binary::NotEqual),
    (">", Binary::Greater),
    ("<", Binary::Lesser),
    ("=", Binary::Equal),
    ("+", Binary::Addition),
    ("-", Binary::Subtraction),
    ("*", Binary::Multiplication),
    ("/", Binary::Division),
    ("%", Binary::Modulus),
    ("^", Binary::Power),
    ("&", Binary::Concatenation),
];

fn tokenize(text: &str, offset: usize, locale: &Locale) -> Result<Vec<(Token, usize)>, FormulaError> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        let position = offset + (text.len() - rest.len());

        if ch.is_whitespace() {
            rest = &rest[ch.len_utf8()..];
            continue;
        }

        if ch == locale.string_qualifier {
            let (literal, consumed) = read_string(rest, locale)
                .ok_or(FormulaError::UnterminatedString(position))?;
            tokens.push((Token::Text(literal), position));
            rest = &rest[consumed..];
            continue;
        }

        if ch == locale.argument_separator {
            tokens.push((Token::Separator, position));
            rest = &rest[ch.len_utf8()..];
            continue;
        }

        if ch == '(' || ch == ')' {
            let token = if ch == '(' { Token::LParen } else { Token::RParen };
            tokens.push((token, position));
            rest = &rest[1..];
            continue;
        }

        if ch == '[' {
            let kind = rest[1..].chars().next();
            let end = rest
                .find(']')
                .ok_or(FormulaError::UnterminatedReference(position))?;
            let token = match kind {
                Some('@') => Token::Sibling(rest[2..end].to_string()),
                Some('#') => Token::Foreign(rest[2..end].to_string()),
                _ => {
                    return Err(FormulaError::Unexpected {
                        found: "[".to_string(),
                        position,
                    });
                }
            };
            tokens.push((token, position));
            rest = &rest[end + 1..];
            continue;
        }

        if ch.is_ascii_digit() {
            let len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            tokens.push((Token::Number(rest[..len].to_string()), position));
            rest = &rest[len..];
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '.' || c == '_'))
                .unwrap_or(rest.len());
            tokens.push((Token::Ident(rest[..len].to_string()), position));
            rest = &rest[len..];
            continue;
        }

        match OPERATORS.iter().find(|(token, _)| rest.starts_with(token)) {
            Some((token, op)) => {
                tokens.push((Token::Op(*op), position));
                rest = &rest[token.len()..];
            }
            None => {
                return Err(FormulaError::Unexpected {
                    found: ch.to_string(),
                    position,
                });
            }
        }
    }

    Ok(tokens)
}

/// Read a qualified string at the start of `text`. Returns the unescaped content and
/// the number of bytes consumed, or `None` if the string never closes.
fn read_string(text: &str, locale: &Locale) -> Option<(String, usize)> {
    let q = locale.string_qualifier;
    let escape = locale.string_qualifier_escape;
    let mut out = String::new();
    let mut i = q.len_utf8();

    loop {
        let rest = &text[i..];
        if rest.starts_with(escape) {
            out.push(q);
            i += escape.len();
            continue;
        }
        let ch = rest.chars().next()?;
        i += ch.len_utf8();
        if ch == q {
            return Some((out, i));
        }
        out.push(ch);
    }
}

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    locale: &'a Locale,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<(Token, usize), FormulaError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(FormulaError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self, token: &Token, position: usize) -> FormulaError {
        FormulaError::Unexpected {
            found: token.describe(self.locale),
            position,
        }
    }

    fn peek_op(&self, allowed: &[Binary]) -> Option<Binary> {
        match self.peek() {
            Some(Token::Op(op)) if allowed.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn left_assoc(
        &mut self,
        allowed: &[Binary],
        operand: fn(&mut Self) -> Result<Expression, FormulaError>,
    ) -> Result<Expression, FormulaError> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek_op(allowed) {
            self.pos += 1;
            let right = operand(self)?;
            left = Expression::binary_op(op, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expression, FormulaError> {
        self.left_assoc(
            &[
                Binary::Equal,
                Binary::NotEqual,
                Binary::Lesser,
                Binary::Greater,
                Binary::LesserEqual,
                Binary::GreaterEqual,
                Binary::ContainsString,
                Binary::ContainsStringStrict,
                Binary::MatchesRegex,
            ],
            Self::concat,
        )
    }

    fn concat(&mut self) -> Result<Expression, FormulaError> {
        self.left_assoc(&[Binary::Concatenation], Self::additive)
    }

    fn additive(&mut self) -> Result<Expression, FormulaError> {
        self.left_assoc(&[Binary::Addition, Binary::Subtraction], Self::term)
    }

    fn term(&mut self) -> Result<Expression, FormulaError> {
        self.left_assoc(
            &[Binary::Multiplication, Binary::Division, Binary::Modulus],
            Self::power,
        )
    }

    fn power(&mut self) -> Result<Expression, FormulaError> {
        let base = self.unary()?;
        if self.peek_op(&[Binary::Power]).is_some() {
            self.pos += 1;
            let exponent = self.power()?;
            return Ok(Expression::binary_op(Binary::Power, base, exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expression, FormulaError> {
        if self.peek_op(&[Binary::Subtraction]).is_none() {
            return self.primary();
        }
        self.pos += 1;

        if let Some(Token::Number(digits)) = self.peek() {
            let text = format!("-{}", digits);
            self.pos += 1;
            return number_literal(&text);
        }

        let operand = self.unary()?;
        Ok(match operand {
            Expression::Literal(Value::Int(i)) if i.checked_neg().is_some() => {
                Expression::Literal(Value::Int(-i))
            }
            Expression::Literal(Value::Double(d)) => Expression::Literal(Value::Double(-d)),
            other => Expression::call(Function::Negate, vec![other]),
        })
    }

    fn primary(&mut self) -> Result<Expression, FormulaError> {
        let (token, position) = self.next()?;
        match token {
            Token::Number(text) => number_literal(&text),
            Token::Text(s) => Ok(Expression::Literal(Value::String(s))),
            Token::Sibling(name) => Ok(Expression::Sibling(Column::new(name))),
            Token::Foreign(name) => Ok(Expression::Foreign(Column::new(name))),
            Token::LParen => {
                let inner = self.comparison()?;
                match self.next()? {
                    (Token::RParen, _) => Ok(inner),
                    (other, position) => Err(self.unexpected(&other, position)),
                }
            }
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return self.call(&name);
                }
                if name.eq_ignore_ascii_case(self.locale.current_cell_identifier) {
                    return Ok(Expression::Identity);
                }
                self.locale
                    .constant(&name)
                    .map(Expression::Literal)
                    .ok_or(FormulaError::UnknownIdentifier(name))
            }
            other => Err(self.unexpected(&other, position)),
        }
    }

    /// Parse the argument list of `name(`; the opening parenthesis is already consumed.
    fn call(&mut self, name: &str) -> Result<Expression, FormulaError> {
        let function = Function::from_name(name, self.locale)
            .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;

        let mut arguments = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                arguments.push(self.comparison()?);
                match self.next()? {
                    (Token::Separator, _) => continue,
                    (Token::RParen, _) => break,
                    (other, position) => return Err(self.unexpected(&other, position)),
                }
            }
        }

        if !function.arity().valid(arguments.len()) {
            return Err(FormulaError::Arity {
                function: function.name(self.locale).to_string(),
                count: arguments.len(),
            });
        }
        Ok(Expression::call(function, arguments))
    }
}

fn number_literal(text: &str) -> Result<Expression, FormulaError> {
    let value = if text.contains('.') {
        text.parse::<f64>().ok().map(Value::Double)
    } else {
        text.parse::<i64>().ok().map(Value::Int)
    };
    value
        .map(Expression::Literal)
        .ok_or_else(|| FormulaError::InvalidNumber(text.to_string()))
}
