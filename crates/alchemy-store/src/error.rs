use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// Caller-supplied data was rejected.
    InvalidData(String),
    /// Stored state broke an invariant the store maintains.
    Corrupt(String),
    /// Operation on a starter element, which is never renamed or deleted.
    Protected(String),
    /// A rename would fold two combinations with different results together.
    Conflict(String),
    NotFound(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::Corrupt(msg) => write!(f, "corrupt store: {msg}"),
            StoreError::Protected(name) => write!(f, "'{name}' is a protected starter element"),
            StoreError::Conflict(msg) => write!(f, "conflict: {msg}"),
            StoreError::NotFound(name) => write!(f, "element not found: {name}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
