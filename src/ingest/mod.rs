//! Upload ingestion: spreadsheet reading and ISSN validation
//!
//! [`read_identifier_column`] pulls the raw values of the ISSN column out of an
//! uploaded CSV or workbook; [`validate_codes`] turns them into the normalized
//! codes that become identifier rows.

use std::collections::HashSet;

mod spreadsheet;

pub use spreadsheet::{SpreadsheetFormat, detect_format, read_identifier_column};

/// Length of a normalized ISSN
pub const CODE_LEN: usize = 8;

/// Normalize one raw spreadsheet value into an 8-character ISSN code
///
/// Surrounding whitespace and every dash are removed and a lower-case check
/// character is upper-cased. Returns `None` unless exactly eight ASCII
/// alphanumeric characters remain.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    (code.len() == CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric())).then_some(code)
}

/// Result of validating a column of raw values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedCodes {
    /// Codes to create, in first-seen order
    pub accepted: Vec<String>,
    /// Raw values that did not normalize
    pub invalid: Vec<String>,
    /// Normalized codes skipped because they were already present
    pub duplicates: Vec<String>,
}

/// Validate raw values against the codes a batch already holds
///
/// Exact repeats of a raw value are dropped silently; distinct raw values that
/// normalize to an existing or already-accepted code are reported as duplicates.
pub fn validate_codes<I, S>(raw_values: I, existing: &HashSet<String>) -> ValidatedCodes
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = ValidatedCodes::default();
    let mut seen_raw = HashSet::new();
    let mut seen_codes = existing.clone();

    for raw in raw_values {
        let raw = raw.as_ref().trim();
        if raw.is_empty() || !seen_raw.insert(raw.to_string()) {
            continue;
        }

        match normalize_code(raw) {
            Some(code) => {
                if seen_codes.insert(code.clone()) {
                    result.accepted.push(code);
                } else {
                    tracing::info!(code = %code, "duplicate ISSN skipped");
                    result.duplicates.push(code);
                }
            }
            None => {
                tracing::warn!(value = raw, "skipping invalid ISSN format");
                result.invalid.push(raw.to_string());
            }
        }
    }

    result
}
