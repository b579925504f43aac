//! Shared engine types.

use std::fmt;

/// Access mode of an engine transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only; may run alongside other read-only transactions.
    ReadOnly,
    /// Reads and writes; excludes overlapping transactions while live.
    ReadWrite,
    /// Schema changes during an open upgrade. Never created by callers.
    VersionChange,
}

impl TransactionMode {
    /// Whether the mode permits writes.
    pub fn is_writable(self) -> bool {
        !matches!(self, TransactionMode::ReadOnly)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionMode::ReadOnly => "readonly",
            TransactionMode::ReadWrite => "readwrite",
            TransactionMode::VersionChange => "versionchange",
        })
    }
}

/// Parameters of an object store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreParams {
    /// Dotted path of the key inside each record. `None` means keys are
    /// supplied with each write.
    pub key_path: Option<String>,
    /// Whether missing keys are generated from a counter starting at 1.
    pub auto_increment: bool,
}

/// Parameters of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexParams {
    /// Dotted path of the indexed field.
    pub key_path: String,
    /// Whether each index key may map to at most one record.
    pub unique: bool,
    /// Whether array values index every element separately.
    pub multi_entry: bool,
}

impl IndexParams {
    /// A plain, non-unique index on `key_path`.
    pub fn new(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            unique: false,
            multi_entry: false,
        }
    }
}
