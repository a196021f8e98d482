//! Output redaction of sensitive columns.
//!
//! Redaction is by column name only: a column named `ssn`, `dob`,
//! `password`, `password_hash`, `api_key`, `secret` or `token`, any column
//! ending in `_` plus one of those, and any credit card number column has its
//! value replaced with [`REDACTION_MASK`]. Matching is case-insensitive.

use crate::backends::Row;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Value written in place of a sensitive column.
pub const REDACTION_MASK: &str = "***REDACTED***";

/// Column names redacted exactly or as a `_name` suffix.
pub const SENSITIVE_NAMES: &[&str] = &[
    "ssn",
    "dob",
    "password",
    "password_hash",
    "api_key",
    "secret",
    "token",
    "credit_card_number",
];

fn sensitive_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(&format!("(?i)^(?:.*_)?(?:{})$", SENSITIVE_NAMES.join("|"))).ok()
        })
        .as_ref()
}

/// True when values of `column` must be masked.
///
/// Fails closed: if the pattern could not be compiled every column is
/// treated as sensitive.
pub fn is_sensitive_column(column: &str) -> bool {
    sensitive_pattern().is_none_or(|re| re.is_match(column))
}

/// Masks sensitive columns of one row in place.
pub fn redact_row(row: &mut Row) {
    for (column, value) in row.iter_mut() {
        if is_sensitive_column(column) {
            *value = Value::String(REDACTION_MASK.to_string());
        }
    }
}

/// Masks sensitive columns of every row.
pub fn redact_rows(mut rows: Vec<Row>) -> Vec<Row> {
    rows.iter_mut().for_each(redact_row);
    rows
}
