//! Error types for engine operations.

use quarry_codec::CodecError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by an engine, either synchronously when a request is
/// issued or through a request's completion callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A database, store or index does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// A uniqueness constraint was violated.
    #[error("constraint violated: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// A key or value is unusable for the requested operation.
    #[error("data error: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// A write was issued against a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction has already committed or aborted.
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// The object is in a state that does not allow the call.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the state violation.
        message: String,
    },

    /// The call is malformed (empty scope, bad version, ...).
    #[error("invalid access: {message}")]
    InvalidAccess {
        /// Description of the problem.
        message: String,
    },

    /// The transaction was aborted before the request could run.
    #[error("transaction aborted")]
    Aborted,

    /// Another open connection prevents an upgrade or deletion.
    #[error("database '{name}' is blocked by another open connection")]
    Blocked {
        /// Database name.
        name: String,
    },

    /// The requested version is lower than the stored one.
    #[error("requested version {requested} is lower than stored version {stored}")]
    Version {
        /// Version requested by the caller.
        requested: u32,
        /// Version currently stored.
        stored: u32,
    },

    /// The upgrade hook failed.
    #[error("upgrade failed: {message}")]
    Upgrade {
        /// Description of the failure.
        message: String,
    },

    /// The connection has been closed.
    #[error("connection is closed")]
    Closed,

    /// The event loop ran out of work while a caller was still waiting.
    #[error("event loop stalled: no pending engine work")]
    Stalled,

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl EngineError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid access error.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::InvalidAccess {
            message: message.into(),
        }
    }

    /// Creates an upgrade error.
    pub fn upgrade(message: impl Into<String>) -> Self {
        Self::Upgrade {
            message: message.into(),
        }
    }
}
