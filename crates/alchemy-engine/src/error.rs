use std::fmt;

use alchemy_core::{FailureKind, PathError, ValidationError};
use alchemy_store::StoreError;

/// Seconds a client is told to wait after the model gateway pushes back.
pub const MODEL_RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidInput(String),
    Unauthorized(String),
    /// Caller exhausted its rate-limit window.
    RateLimited { retry_after: u64 },
    /// Terminal model-gateway failure after retries.
    Model(FailureKind),
    Conflict(String),
    NotFound(String),
    Internal(String),
}

impl EngineError {
    /// Wire name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::RateLimited { .. } | EngineError::Model(FailureKind::RateLimited) => {
                "rate_limited"
            }
            EngineError::Model(_) => "service_unavailable",
            EngineError::Conflict(_) => "conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> u16 {
        match self.kind() {
            "invalid_input" => 400,
            "unauthorized" => 401,
            "not_found" => 404,
            "conflict" => 409,
            "rate_limited" => 429,
            "service_unavailable" => 503,
            _ => 500,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            EngineError::RateLimited { retry_after } => Some(*retry_after),
            EngineError::Model(kind) if kind.is_transient() => Some(MODEL_RETRY_AFTER_SECS),
            _ => None,
        }
    }

    /// Model failure class, when the error came from the gateway.
    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            EngineError::Model(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            EngineError::RateLimited { retry_after } => {
                write!(f, "rate limited, retry in {retry_after}s")
            }
            EngineError::Model(FailureKind::AuthFailed) => {
                write!(f, "model gateway rejected credentials (auth_failed)")
            }
            EngineError::Model(kind) => write!(f, "model gateway failed ({kind})"),
            EngineError::Conflict(msg) => write!(f, "conflict: {msg}"),
            EngineError::NotFound(msg) => write!(f, "not found: {msg}"),
            EngineError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Protected(name) => {
                EngineError::InvalidInput(format!("'{name}' is a protected starter element"))
            }
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::NotFound(name) => EngineError::NotFound(name),
            StoreError::InvalidData(msg) => EngineError::InvalidInput(msg),
            StoreError::Corrupt(msg) => EngineError::Internal(msg),
            StoreError::Sqlite(e) => EngineError::Internal(e.to_string()),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::InvalidInput(e.to_string())
    }
}

impl From<PathError> for EngineError {
    fn from(e: PathError) -> Self {
        EngineError::InvalidInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EngineError::InvalidInput("x".into()).status(), 400);
        assert_eq!(EngineError::Unauthorized("x".into()).status(), 401);
        assert_eq!(EngineError::NotFound("x".into()).status(), 404);
        assert_eq!(EngineError::Conflict("x".into()).status(), 409);
        assert_eq!(EngineError::RateLimited { retry_after: 5 }.status(), 429);
        assert_eq!(EngineError::Model(FailureKind::RateLimited).status(), 429);
        assert_eq!(EngineError::Model(FailureKind::Overloaded).status(), 503);
        assert_eq!(EngineError::Model(FailureKind::AuthFailed).status(), 503);
        assert_eq!(EngineError::Internal("x".into()).status(), 500);
    }

    #[test]
    fn test_retry_after_only_when_retryable() {
        assert_eq!(
            EngineError::RateLimited { retry_after: 7 }.retry_after(),
            Some(7)
        );
        assert_eq!(
            EngineError::Model(FailureKind::RateLimited).retry_after(),
            Some(MODEL_RETRY_AFTER_SECS)
        );
        assert_eq!(EngineError::Model(FailureKind::AuthFailed).retry_after(), None);
        assert_eq!(EngineError::Conflict("x".into()).retry_after(), None);
    }

    #[test]
    fn test_store_errors_convert() {
        let e: EngineError = StoreError::Protected("Fire".into()).into();
        assert_eq!(e.kind(), "invalid_input");
        let e: EngineError = StoreError::Conflict("x".into()).into();
        assert_eq!(e.kind(), "conflict");
        let e: EngineError = StoreError::InvalidData("x".into()).into();
        assert_eq!(e.kind(), "invalid_input");
        let e: EngineError = StoreError::Corrupt("unknown origin".into()).into();
        assert_eq!(e.kind(), "internal");
        assert_eq!(e.status(), 500);
    }
}
