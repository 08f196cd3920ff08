//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Storage keys: letters, digits, `_`, `-` and `.`
static STORAGE_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9._-]*$").unwrap());

/// Entry ids and grouping references
static REFERENCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]*$").unwrap());

/// Validate the key under which the log document is stored
pub fn validate_storage_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= 128 && STORAGE_KEY_REGEX.is_match(key)
}

/// Validate an entry id or an `idReference` used in a lookup
pub fn validate_reference(reference: &str) -> bool {
    !reference.is_empty() && reference.len() <= 128 && REFERENCE_REGEX.is_match(reference)
}

/// Validate a CSV field separator
pub fn validate_csv_separator(separator: &str) -> bool {
    let mut chars = separator.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(c), None) if c != '"' && c != '\n' && c != '\r'
    )
}
