//! Row storage: CSV import and export.

pub mod csv;

pub use csv::{load_rows, parse_csv_field, parse_csv_rows, read_rows, write_csv_rows};
