//! Columns and rows.
//!
//! A [`Row`] is an ordered list of `(Column, Value)` pairs; insertion order is display
//! order and column names are unique within a row. Lookup by name goes through an
//! index built once at construction, since the inference search evaluates many
//! expressions against the same row.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

use super::value::Value;

/// A column identifier. Equality and hashing are by name.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Column(String);

impl Column {
    pub fn new(name: impl Into<String>) -> Column {
        Column(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Column {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Column {
        Column::new(name)
    }
}

impl From<String> for Column {
    fn from(name: String) -> Column {
        Column(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Duplicate column '{0}' in row")]
    DuplicateColumn(Column),

    #[error("Row has {values} values for {columns} columns")]
    LengthMismatch { columns: usize, values: usize },
}

/// One record: ordered, uniquely named values.
#[derive(Clone, Debug, Default)]
pub struct Row {
    columns: Vec<Column>,
    values: Vec<Value>,
    index: HashMap<Column, usize>,
}

impl Row {
    pub fn new() -> Row {
        Row::default()
    }

    /// Build a row from parallel column and value lists.
    pub fn with_columns(columns: Vec<Column>, values: Vec<Value>) -> Result<Row, RowError> {
        if columns.len() != values.len() {
            return Err(RowError::LengthMismatch {
                columns: columns.len(),
                values: values.len(),
            });
        }

        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if index.insert(column.clone(), i).is_some() {
                return Err(RowError::DuplicateColumn(column.clone()));
            }
        }

        Ok(Row {
            columns,
            values,
            index,
        })
    }

    /// Build a row from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<I, C, V>(pairs: I) -> Result<Row, RowError>
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<Column>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<Column>, Vec<Value>) = pairs
            .into_iter()
            .map(|(c, v)| (c.into(), v.into()))
            .unzip();
        Row::with_columns(columns, values)
    }

    /// Value of the named column, if the row has it.
    pub fn get<Q>(&self, column: &Q) -> Option<&Value>
    where
        Column: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(column).map(|&i| &self.values[i])
    }

    pub fn index_of<Q>(&self, column: &Q) -> Option<usize>
    where
        Column: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(column).copied()
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn column_at(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Column, &Value)> {
        self.columns.iter().zip(self.values.iter())
    }

    /// Return a copy of this row with `column` set to `value`. An existing column keeps
    /// its position; a new one is appended.
    pub fn with_value(&self, column: Column, value: Value) -> Row {
        let mut row = self.clone();
        match row.index.get(&column) {
            Some(&i) => row.values[i] = value,
            None => {
                row.index.insert(column.clone(), row.columns.len());
                row.columns.push(column);
                row.values.push(value);
            }
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::from_pairs([("first", "John"), ("last", "Doe")]).unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        let row = sample();
        assert_eq!(row.get("last"), Some(&Value::from("Doe")));
        assert_eq!(row.get(&Column::new("first")), Some(&Value::from("John")));
        assert!(row.get("middle").is_none());
        assert_eq!(row.index_of("last"), Some(1));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = Row::from_pairs([("a", 1i64), ("a", 2i64)]);
        assert_eq!(result.unwrap_err(), RowError::DuplicateColumn(Column::new("a")));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = Row::with_columns(vec![Column::new("a")], vec![]);
        assert!(matches!(result, Err(RowError::LengthMismatch { columns: 1, values: 0 })));
    }

    #[test]
    fn test_with_value_replaces_or_appends() {
        let row = sample();
        let replaced = row.with_value(Column::new("first"), Value::from("Jane"));
        assert_eq!(replaced.columns(), row.columns());
        assert_eq!(replaced.get("first"), Some(&Value::from("Jane")));

        let appended = row.with_value(Column::new("full"), Value::from("John Doe"));
        assert_eq!(appended.len(), 3);
        assert_eq!(appended.column_at(2), Some(&Column::new("full")));
        assert_eq!(appended.index_of("full"), Some(2));
        // The original row is untouched.
        assert_eq!(row.len(), 2);
    }
}
