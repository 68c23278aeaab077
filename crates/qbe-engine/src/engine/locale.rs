//! Locale-dependent punctuation, constants and display formatting.
//!
//! A [`Locale`] only changes how formulas and values are written, never what they
//! mean. Numeric literals in formulas always use `.` as decimal separator; the
//! locale's decimal separator only applies to display strings.

use serde::{Deserialize, Serialize};

use super::value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Nl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Locale {
    pub language: Language,
    pub string_qualifier: char,
    pub string_qualifier_escape: &'static str,
    pub argument_separator: char,
    pub decimal_separator: char,
    pub current_cell_identifier: &'static str,
    pub true_constant: &'static str,
    pub false_constant: &'static str,
    pub empty_constant: &'static str,
    pub current_value_phrase: &'static str,
    pub sibling_phrase: &'static str,
    pub foreign_phrase: &'static str,
}

impl Locale {
    pub const fn english() -> Locale {
        Locale {
            language: Language::En,
            string_qualifier: '"',
            string_qualifier_escape: "\"\"",
            argument_separator: ',',
            decimal_separator: '.',
            current_cell_identifier: "RC",
            true_constant: "TRUE",
            false_constant: "FALSE",
            empty_constant: "EMPTY",
            current_value_phrase: "current value",
            sibling_phrase: "value in column",
            foreign_phrase: "value in foreign column",
        }
    }

    pub const fn dutch() -> Locale {
        Locale {
            language: Language::Nl,
            string_qualifier: '"',
            string_qualifier_escape: "\"\"",
            argument_separator: ';',
            decimal_separator: ',',
            current_cell_identifier: "RC",
            true_constant: "WAAR",
            false_constant: "ONWAAR",
            empty_constant: "LEEG",
            current_value_phrase: "huidige waarde",
            sibling_phrase: "waarde in kolom",
            foreign_phrase: "waarde in externe kolom",
        }
    }

    pub fn for_language(language: Language) -> Locale {
        match language {
            Language::En => Locale::english(),
            Language::Nl => Locale::dutch(),
        }
    }

    /// Parse a language code such as `"en"` or `"nl"`.
    pub fn from_code(code: &str) -> Option<Locale> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Locale::english()),
            "nl" => Some(Locale::dutch()),
            _ => None,
        }
    }

    /// Display string for a value in this locale.
    pub fn local_string_for(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Double(d) => {
                let text = format_number(*d);
                if self.decimal_separator == '.' {
                    text
                } else {
                    text.replace('.', &self.decimal_separator.to_string())
                }
            }
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => self.bool_constant(*b).to_string(),
            Value::Empty => String::new(),
            Value::Invalid => "#INVALID!".to_string(),
        }
    }

    pub fn bool_constant(&self, b: bool) -> &'static str {
        if b {
            self.true_constant
        } else {
            self.false_constant
        }
    }

    /// Resolve a bare constant name (case-insensitive) to its value.
    pub fn constant(&self, name: &str) -> Option<Value> {
        if name.eq_ignore_ascii_case(self.true_constant) {
            Some(Value::Bool(true))
        } else if name.eq_ignore_ascii_case(self.false_constant) {
            Some(Value::Bool(false))
        } else if name.eq_ignore_ascii_case(self.empty_constant) {
            Some(Value::Empty)
        } else {
            None
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale::english()
    }
}

/// Format a number for display.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "#NAN!".to_string()
    } else if n.is_infinite() {
        "#INF!".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e10 {
        format!("{:.0}", n)
    } else {
        let text = format!("{:.6}", n);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Locale-neutral numeric literal text for formulas. Integral doubles keep a `.0`
/// suffix so they parse back as doubles.
pub fn format_double_literal(n: f64) -> String {
    let text = n.to_string();
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{}.0", text)
    }
}
