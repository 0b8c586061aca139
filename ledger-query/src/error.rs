//! Error types for the ledger query core

use thiserror::Error;

/// Result type for ledger query operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger query errors
#[derive(Error, Debug)]
pub enum Error {
    /// Predicate document does not follow the query grammar
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Pagination token was not produced by the cursor codec
    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    /// Time parameter is not a valid RFC3339 timestamp
    #[error("Invalid timestamp for '{field}': {reason}")]
    InvalidTimestamp {
        /// Request field holding the timestamp
        field: String,
        /// Parser message
        reason: String,
    },

    /// Transaction rejected by the append path
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Caller tried to write a key owned by the lineage manager
    #[error("Reserved metadata key: {0}")]
    ReservedMetadataKey(String),

    /// Backend failure during aggregation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Caller-initiated abort or timeout
    #[error("Query cancelled: {0}")]
    Cancelled(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// Transaction already carries a reverted marker
    #[error("Transaction already reverted: {0}")]
    AlreadyReverted(u64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Stable error class exposed to the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed caller input (client error)
    Validation,
    /// Any other failure (server error)
    Internal,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Error class for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidQuery(_)
            | Error::MalformedCursor(_)
            | Error::InvalidTimestamp { .. }
            | Error::InvalidTransaction(_)
            | Error::ReservedMetadataKey(_) => ErrorCode::Validation,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the caller gave up, as opposed to the system failing
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
