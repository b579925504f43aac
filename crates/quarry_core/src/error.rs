//! Error types for the access layer.

use quarry_codec::CodecError;
use quarry_engine::EngineError;
use thiserror::Error;

/// Result type for access-layer operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by databases, transactions and stores.
///
/// Every error is `Clone` because one failure is observed by every caller
/// waiting on the same open or the same transaction outcome.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// The engine refused to open or upgrade the database.
    #[error("cannot open database '{name}': {source}")]
    Open {
        /// Name of the database.
        name: String,
        /// The engine failure.
        source: EngineError,
    },

    /// A store outside the transaction scope was requested.
    #[error("store '{name}' is out of the transaction scope")]
    Scope {
        /// Name of the requested store.
        name: String,
    },

    /// The transaction failed earlier; the failure is replayed.
    #[error("transaction failed: {cause}")]
    Transaction {
        /// The failure that ended the transaction.
        #[source]
        cause: Box<CoreError>,
    },

    /// The transaction has already completed or aborted.
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// A uniqueness constraint was violated.
    #[error("constraint violated: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// The transaction was aborted.
    #[error("transaction aborted")]
    Aborted,

    /// The database declares no store with this name.
    #[error("store not found: {name}")]
    StoreNotFound {
        /// Name of the store.
        name: String,
    },

    /// The store declares no index with this name.
    #[error("index '{name}' not found on store '{store}'")]
    IndexNotFound {
        /// Name of the store.
        store: String,
        /// Name of the index.
        name: String,
    },

    /// A transaction mode string was not recognized.
    #[error("invalid transaction mode '{mode}'")]
    InvalidMode {
        /// The rejected mode.
        mode: String,
    },

    /// A key or value cannot be used for the operation.
    #[error("data error: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// The database was closed.
    #[error("database is closed")]
    Closed,

    /// The schema declarations are inconsistent.
    #[error("invalid schema: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// Any other engine failure, unchanged.
    #[error(transparent)]
    Engine(EngineError),
}

impl CoreError {
    /// Creates a scope error.
    pub fn scope(name: impl Into<String>) -> Self {
        Self::Scope { name: name.into() }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a store not found error.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::StoreNotFound { name: name.into() }
    }

    /// Wraps a terminal failure for replay by later calls.
    pub fn replay(cause: &CoreError) -> Self {
        Self::Transaction {
            cause: Box::new(cause.clone()),
        }
    }
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Constraint { message } => Self::Constraint { message },
            EngineError::Data { message } => Self::Data { message },
            EngineError::Aborted => Self::Aborted,
            EngineError::TransactionInactive => Self::TransactionInactive,
            EngineError::Closed => Self::Closed,
            other => Self::Engine(other),
        }
    }
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        Self::data(err.to_string())
    }
}
