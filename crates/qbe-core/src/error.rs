//! Error types for qbe core.

use qbe_engine::engine::{Column, FormulaError, RowError};
use thiserror::Error;

/// Errors that can occur while loading data, configuring or applying formulas
#[derive(Error, Debug)]
pub enum QbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    #[error("Row error: {0}")]
    Row(#[from] RowError),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("CSV file is empty")]
    EmptyCsv,

    #[error("Circular dependency detected at column {column}")]
    CircularDependency { column: Column },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

pub type Result<T> = std::result::Result<T, QbeError>;
