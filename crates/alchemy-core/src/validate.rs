use std::fmt;

use unicode_segmentation::UnicodeSegmentation;

use crate::constants::{KEY_SEPARATOR, MAX_NAME_LEN, is_sentinel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Empty,
    TooLong(usize),
    ControlCharacter,
    /// Contains the combination-key separator.
    Separator,
    Reserved(String),
    Glyph(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Empty => write!(f, "name must not be empty"),
            ValidationError::TooLong(len) => {
                write!(f, "name is {len} characters, limit is {MAX_NAME_LEN}")
            }
            ValidationError::ControlCharacter => write!(f, "name contains control characters"),
            ValidationError::Separator => write!(f, "name must not contain '{KEY_SEPARATOR}'"),
            ValidationError::Reserved(name) => write!(f, "'{name}' is a reserved name"),
            ValidationError::Glyph(msg) => write!(f, "invalid glyph: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a display name and return it trimmed.
///
/// Names starting with `_` are reserved for placeholder sentinels, and
/// `+` is reserved for keys so that two distinct pairs never share one.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = trimmed.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::TooLong(len));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacter);
    }
    if trimmed.contains(KEY_SEPARATOR) {
        return Err(ValidationError::Separator);
    }
    if is_sentinel(trimmed) || trimmed.starts_with('_') {
        return Err(ValidationError::Reserved(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Check that `glyph` is exactly one grapheme cluster and not plain text.
pub fn validate_glyph(glyph: &str) -> Result<String, ValidationError> {
    let trimmed = glyph.trim();
    let count = trimmed.graphemes(true).count();
    if count != 1 {
        return Err(ValidationError::Glyph(format!(
            "expected exactly one glyph, got {count}"
        )));
    }
    if trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation())
    {
        return Err(ValidationError::Glyph(format!("'{trimmed}' is not a glyph")));
    }
    Ok(trimmed.to_string())
}
