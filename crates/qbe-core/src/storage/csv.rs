//! CSV import/export functionality
//!
//! The first line is the header. Every following line is one [`Row`] with the header's
//! columns; short lines are padded with [`Value::Empty`].

use crate::error::{QbeError, Result};
use qbe_engine::engine::{Column, Row, Value};
use qbe_engine::{Fallible, Future};
use std::path::{Path, PathBuf};

/// Parse CSV text into rows.
pub fn parse_csv_rows(text: &str) -> Result<Vec<Row>> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let Some((_, header)) = lines.next() else {
        return Err(QbeError::EmptyCsv);
    };

    let columns: Vec<Column> = parse_csv_line(header).into_iter().map(Column::from).collect();
    // Rejects duplicate headers even when there are no data lines.
    Row::with_columns(columns.clone(), vec![Value::Empty; columns.len()])?;

    let mut rows = Vec::new();
    for (line_idx, line) in lines {
        let mut values: Vec<Value> = parse_csv_line(line)
            .iter()
            .map(|field| parse_csv_field(field))
            .collect();
        if values.len() > columns.len() {
            return Err(QbeError::Parse {
                line: line_idx + 1,
                message: format!("expected {} fields, found {}", columns.len(), values.len()),
            });
        }
        values.resize(columns.len(), Value::Empty);
        rows.push(Row::with_columns(columns.clone(), values)?);
    }
    Ok(rows)
}

/// Read and parse a CSV file.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    let content = std::fs::read_to_string(path)?;
    parse_csv_rows(&content)
}

/// Read a CSV file on the worker queue of the job passed to [`Future::get`].
pub fn load_rows(path: impl Into<PathBuf>) -> Future<Fallible<Vec<Row>>> {
    let path = path.into();
    Future::new(move |batch| {
        let path = path.clone();
        let worker = batch.clone();
        let scheduled = batch.job().spawn(move || {
            let result = worker
                .job()
                .time("load csv", || read_rows(&path))
                .map(Fallible::from)
                .unwrap_or_else(|| Fallible::failure("cancelled"));
            worker.satisfy(result);
        });
        if !scheduled {
            batch.satisfy(Fallible::failure("cancelled"));
        }
    })
}

/// Parse a single CSV line, handling quoted fields
pub(crate) fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_was_quoted = false;
    let mut chars = line.chars().peekable();

    let mut finish = |current: &mut String, quoted: bool| {
        let field = std::mem::take(current);
        fields.push(if quoted { field } else { field.trim().to_string() });
    };

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => {
                    in_quotes = true;
                    field_was_quoted = true;
                }
                ',' => {
                    finish(&mut current, field_was_quoted);
                    field_was_quoted = false;
                }
                _ => current.push(c),
            }
        }
    }
    finish(&mut current, field_was_quoted);
    fields
}

/// Parse a CSV field into a value
/// - Empty string -> Empty
/// - Integer -> Int, other finite number -> Double (unless it has leading zeros like "007")
/// - Otherwise -> String
pub fn parse_csv_field(field: &str) -> Value {
    if field.is_empty() {
        return Value::Empty;
    }

    // Explicit surrounding whitespace (from quoted fields) keeps the field a string.
    let trimmed = field.trim();
    if field != trimmed {
        return Value::from(field);
    }

    if trimmed.starts_with('0')
        && trimmed.len() > 1
        && !trimmed.starts_with("0.")
        && trimmed.chars().nth(1).is_some_and(|c| c.is_ascii_digit())
    {
        return Value::from(trimmed);
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Int(n);
    }

    // Rust also parses "inf" and "NaN"; those stay text.
    let numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if numeric {
        if let Some(n) = trimmed.parse::<f64>().ok().filter(|n| n.is_finite()) {
            return Value::Double(n);
        }
    }

    Value::from(trimmed)
}

/// Render rows as CSV. The header is the union of all rows' columns in first-seen order;
/// a row without one of the columns gets an empty field.
pub fn write_csv_rows(rows: &[Row]) -> String {
    let mut columns: Vec<&Column> = Vec::new();
    for row in rows {
        for column in row.columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| escape_csv_field(c.name())).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|c| {
                row.get(c.name())
                    .map(csv_field_for)
                    .unwrap_or_default()
            })
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn csv_field_for(value: &Value) -> String {
    match value {
        Value::Int(_) | Value::Double(_) => value.to_string(),
        other => escape_csv_field(&other.to_string()),
    }
}

/// Escape a field for CSV output
fn escape_csv_field(field: &str) -> String {
    // Guard against CSV formula injection in spreadsheet apps.
    let first_non_space = field.trim_start_matches([' ', '\t']).chars().next();
    let safe_field = if matches!(first_non_space, Some('=' | '+' | '-' | '@')) {
        format!("'{}", field)
    } else {
        field.to_string()
    };

    if safe_field.contains(',')
        || safe_field.contains('"')
        || safe_field.contains('\n')
        || safe_field.contains('\r')
        || safe_field != safe_field.trim()
    {
        format!("\"{}\"", safe_field.replace('"', "\"\""))
    } else {
        safe_field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_parse_csv_line_simple() {
        assert_eq!(parse_csv_line("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_csv_line_quoted() {
        assert_eq!(
            parse_csv_line(r#"a,"hello, world",c"#),
            vec!["a", "hello, world", "c"]
        );
    }

    #[test]
    fn test_parse_csv_line_quoted_preserves_whitespace() {
        assert_eq!(
            parse_csv_line(r#""  keep me  ",x"#),
            vec!["  keep me  ", "x"]
        );
    }

    #[test]
    fn test_parse_csv_line_escaped_quotes() {
        assert_eq!(
            parse_csv_line(r#"a,"say ""hello""",c"#),
            vec!["a", r#"say "hello""#, "c"]
        );
    }

    #[test]
    fn test_parse_csv_line_trailing_empty_field() {
        assert_eq!(parse_csv_line("a,"), vec!["a", ""]);
    }

    #[test]
    fn test_escape_csv_field() {
        assert_eq!(escape_csv_field("simple"), "simple");
        assert_eq!(escape_csv_field("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv_field("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_csv_field(" padded "), "\" padded \"");
    }

    #[test]
    fn test_escape_csv_field_formula_injection() {
        assert_eq!(escape_csv_field("=1+1"), "'=1+1");
        assert_eq!(escape_csv_field("\t-2+3"), "'\t-2+3");
        assert_eq!(escape_csv_field("@cmd"), "'@cmd");
    }

    #[test]
    fn test_parse_csv_field_numbers() {
        assert!(parse_csv_field("42").is_identical(&Value::Int(42)));
        assert!(parse_csv_field("-7").is_identical(&Value::Int(-7)));
        assert!(parse_csv_field("2.5").is_identical(&Value::Double(2.5)));
        assert!(parse_csv_field("1e3").is_identical(&Value::Double(1000.0)));
        assert!(parse_csv_field("0").is_identical(&Value::Int(0)));
        assert!(parse_csv_field("0.5").is_identical(&Value::Double(0.5)));
    }

    #[test]
    fn test_parse_csv_field_text() {
        assert!(parse_csv_field("007").is_identical(&Value::from("007")));
        assert!(parse_csv_field("inf").is_identical(&Value::from("inf")));
        assert!(parse_csv_field("NaN").is_identical(&Value::from("NaN")));
        assert!(parse_csv_field("1-2").is_identical(&Value::from("1-2")));
        assert!(parse_csv_field("  keep me  ").is_identical(&Value::from("  keep me  ")));
        assert!(parse_csv_field("").is_identical(&Value::Empty));
    }

    #[test]
    fn test_parse_csv_rows() {
        let rows = parse_csv_rows("first,last,age\nJohn,Doe,41\n\"Ann, Jr\",,7\nBob\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("first"), Some(&Value::from("John")));
        assert!(rows[0].get("age").unwrap().is_identical(&Value::Int(41)));
        assert_eq!(rows[1].get("first"), Some(&Value::from("Ann, Jr")));
        assert!(rows[1].get("last").unwrap().is_empty());
        assert!(rows[2].get("age").unwrap().is_empty());
        assert_eq!(rows[2].columns(), rows[0].columns());
    }

    #[test]
    fn test_parse_csv_rows_errors() {
        assert!(matches!(parse_csv_rows(""), Err(QbeError::EmptyCsv)));
        assert!(matches!(parse_csv_rows("\n  \n"), Err(QbeError::EmptyCsv)));
        assert!(matches!(parse_csv_rows("a,a\n1,2"), Err(QbeError::Row(_))));
        assert!(matches!(parse_csv_rows("a,a"), Err(QbeError::Row(_))));
        assert!(matches!(
            parse_csv_rows("a,b\n1,2\n1,2,3"),
            Err(QbeError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn test_header_only_gives_no_rows() {
        assert!(parse_csv_rows("a,b\n").unwrap().is_empty());
    }

    #[test]
    fn test_write_csv_rows() {
        let rows = vec![
            Row::from_pairs([("name", Value::from("Doe, John")), ("n", Value::Int(3))]).unwrap(),
            Row::from_pairs([("name", Value::from("=cmd")), ("extra", Value::Double(-2.5))]).unwrap(),
        ];
        assert_eq!(
            write_csv_rows(&rows),
            "name,n,extra\n\"Doe, John\",3,\n'=cmd,,-2.5\n"
        );
    }

    #[test]
    fn test_write_then_parse_keeps_values() {
        let text = "a,b,c\n\"x \"\"y\"\"\",007,2.5\n";
        let rows = parse_csv_rows(text).unwrap();
        assert_eq!(write_csv_rows(&rows), text);
    }

    #[test]
    fn test_load_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"n\n1\n2\n").unwrap();

        let future = load_rows(file.path());
        let (tx, rx) = mpsc::channel();
        future.get(None, move |rows: Fallible<Vec<Row>>| tx.send(rows).unwrap());
        let rows = rx.recv_timeout(Duration::from_secs(5)).unwrap().require();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let future = load_rows(dir.path().join("missing.csv"));
        let (tx, rx) = mpsc::channel();
        future.get(None, move |rows: Fallible<Vec<Row>>| tx.send(rows).unwrap());
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(result.into_result().unwrap_err().starts_with("IO error"));
    }
}
