//! Model reply handling.
//!
//! A gateway call ends in one of four outcomes: a parsed candidate, a
//! transient failure worth retrying, a permanent failure, or a reply that
//! arrived but could not be used.

use std::fmt;

use serde::Deserialize;

use crate::constants::is_starter;
use crate::validate::{ValidationError, validate_glyph, validate_name};

/// Terminal classification of a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    RateLimited,
    AuthFailed,
    Overloaded,
    ValidationFailed,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::AuthFailed => "auth_failed",
            FailureKind::Overloaded => "overloaded",
            FailureKind::ValidationFailed => "validation_failed",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Classify an HTTP status from the model gateway.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => FailureKind::RateLimited,
            401 | 403 => FailureKind::AuthFailed,
            408 | 500..=599 => FailureKind::Overloaded,
            _ => FailureKind::Unknown,
        }
    }

    /// Transient failures are retried (possibly against a fallback model).
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Overloaded)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `(name, glyph)` pair proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub glyph: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    NoJson,
    InvalidJson(String),
    Name(ValidationError),
    Glyph(ValidationError),
    StarterResult(String),
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyError::NoJson => write!(f, "reply contains no JSON object"),
            ReplyError::InvalidJson(e) => write!(f, "reply JSON is invalid: {e}"),
            ReplyError::Name(e) => write!(f, "reply name rejected: {e}"),
            ReplyError::Glyph(e) => write!(f, "reply glyph rejected: {e}"),
            ReplyError::StarterResult(name) => {
                write!(f, "reply names starter element '{name}' as a result")
            }
        }
    }
}

impl std::error::Error for ReplyError {}

#[derive(Deserialize)]
struct WireCandidate {
    name: String,
    #[serde(alias = "emoji")]
    glyph: String,
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Slice from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let text = strip_code_fences(text);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse and validate a combine reply of the form `{"name": .., "glyph": ..}`.
pub fn parse_candidate(text: &str) -> Result<Candidate, ReplyError> {
    let json = extract_json_object(text).ok_or(ReplyError::NoJson)?;
    let wire: WireCandidate =
        serde_json::from_str(json).map_err(|e| ReplyError::InvalidJson(e.to_string()))?;
    let name = validate_name(&wire.name).map_err(ReplyError::Name)?;
    if is_starter(&name) {
        return Err(ReplyError::StarterResult(name));
    }
    let glyph = validate_glyph(&wire.glyph).map_err(ReplyError::Glyph)?;
    Ok(Candidate { name, glyph })
}

/// Result of one call to the model gateway, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Parsed(Candidate),
    Transient(FailureKind),
    Permanent(FailureKind),
    Malformed(String),
}

impl CallOutcome {
    pub fn from_reply(text: &str) -> Self {
        match parse_candidate(text) {
            Ok(candidate) => CallOutcome::Parsed(candidate),
            Err(e) => CallOutcome::Malformed(e.to_string()),
        }
    }

    pub fn from_failure(kind: FailureKind) -> Self {
        if kind.is_transient() {
            CallOutcome::Transient(kind)
        } else {
            CallOutcome::Permanent(kind)
        }
    }
}
