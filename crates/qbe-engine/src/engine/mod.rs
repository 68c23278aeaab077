//! Formula engine API.
//!
//! This module provides the expression model and the formula inference search:
//!
//! - [`Value`], [`Column`], [`Row`] - Data a formula computes over
//! - [`Expression`], [`Variant`] - The expression tree and its closed set of kinds
//! - [`Locale`] - Formula punctuation, constants and display formatting
//! - [`parse_formula`] - Parse formula text into an expression
//! - [`extract_dependencies`] - Columns an expression reads
//! - [`detect_cycle`] - Circular dependency detection between calculated columns
//! - [`infer`], [`Inferer`] - Find expressions that produce a target value

mod cycle;
mod deps;
mod eval;
mod expression;
mod formula;
pub mod infer;
mod locale;
mod row;
mod value;

pub use cycle::detect_cycle;
pub use deps::{extract_dependencies, extract_foreign_dependencies};
pub use expression::{Expression, Variant};
pub use formula::{FormulaError, parse_formula};
pub use infer::{Inferer, SEARCH_ORDER, infer};
pub use locale::{Language, Locale, format_number};
pub use row::{Column, Row, RowError};
pub use value::Value;
