//! The engine contract consumed by the access layer.
//!
//! Every request is asynchronous: it is issued synchronously (issuance may
//! fail immediately, e.g. on a read-only transaction) and its outcome is
//! delivered later through the callback handed over at issuance. An engine
//! transaction commits on its own once it has no pending request, so a
//! dependent request must be issued from inside the previous request's
//! callback to keep the transaction alive.

use crate::error::EngineResult;
use crate::range::{Direction, KeyRange};
use crate::types::{IndexParams, StoreParams, TransactionMode};
use quarry_codec::Value;
use std::sync::Arc;

/// Completion callback of a request.
pub type Callback<T> = Box<dyn FnOnce(EngineResult<T>) + Send>;

/// Listener for a `complete` or `abort` event.
pub type Listener = Box<dyn FnOnce() + Send>;

/// Listener for an `error` event.
pub type ErrorListener = Box<dyn FnOnce(crate::EngineError) + Send>;

/// Cursor callback. Called once per visited record, then once with
/// `Ok(None)` when the range is exhausted. A record is only followed by
/// the next one after [`EngineCursor::advance`] is called.
pub type CursorStep = Box<dyn FnMut(EngineResult<Option<Box<dyn EngineCursor>>>) + Send>;

/// Upgrade hook run inside the version-change transaction of an open.
/// Receives the version stored before the open.
pub type UpgradeHook = Box<dyn FnOnce(&mut dyn VersionChange, u32) -> EngineResult<()> + Send>;

/// An object-store engine.
pub trait Engine: Send + Sync {
    /// Opens `name` at `version`, running `upgrade` first when the stored
    /// version is older.
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeHook,
        done: Callback<Arc<dyn EngineHandle>>,
    );

    /// Deletes database `name` and all of its stores.
    fn delete_database(&self, name: &str, done: Callback<()>);
}

/// Schema operations available during an upgrade.
pub trait VersionChange {
    /// Version stored before this upgrade (0 for a new database).
    fn old_version(&self) -> u32;

    /// Version being opened.
    fn new_version(&self) -> u32;

    /// Names of the existing stores.
    fn store_names(&self) -> Vec<String>;

    /// Creates an object store.
    fn create_store(&mut self, name: &str, params: StoreParams) -> EngineResult<()>;

    /// Deletes an object store with all its records and indexes.
    fn delete_store(&mut self, name: &str) -> EngineResult<()>;

    /// Creates an index over the existing records of `store`.
    fn create_index(&mut self, store: &str, name: &str, params: IndexParams)
        -> EngineResult<()>;

    /// Deletes an index.
    fn delete_index(&mut self, store: &str, name: &str) -> EngineResult<()>;
}

/// An open connection to a database.
pub trait EngineHandle: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Version the connection was opened at.
    fn version(&self) -> u32;

    /// Names of the stores, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Creates a transaction over `scope`. Requests may be issued on it at
    /// once; it starts when no earlier conflicting transaction is live.
    fn transaction(
        &self,
        scope: &[String],
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn EngineTransaction>>;

    /// Closes the connection. Live transactions still finish.
    fn close(&self);
}

/// An engine transaction.
pub trait EngineTransaction: Send + Sync {
    /// Access mode.
    fn mode(&self) -> TransactionMode;

    /// Store names in scope.
    fn scope(&self) -> Vec<String>;

    /// Returns a store inside the scope.
    fn object_store(&self, name: &str) -> EngineResult<Arc<dyn EngineStore>>;

    /// Registers a listener for successful commit.
    fn on_complete(&self, listener: Listener);

    /// Registers a listener for a failed request.
    fn on_error(&self, listener: ErrorListener);

    /// Registers a listener for rollback.
    fn on_abort(&self, listener: Listener);

    /// Rolls the transaction back. Pending requests fail with `Aborted`.
    fn abort(&self) -> EngineResult<()>;
}

/// An object store as seen through one transaction.
pub trait EngineStore: Send + Sync {
    /// Store name.
    fn name(&self) -> &str;

    /// Key path, if the store derives keys from records.
    fn key_path(&self) -> Option<&str>;

    /// Whether the store generates keys.
    fn auto_increment(&self) -> bool;

    /// Index names, sorted.
    fn index_names(&self) -> Vec<String>;

    /// Reads the record at `key`.
    fn get(&self, key: Value, done: Callback<Option<Value>>) -> EngineResult<()>;

    /// Creates or replaces a record. Resolves with the record's key.
    fn put(&self, key: Option<Value>, value: Value, done: Callback<Value>) -> EngineResult<()>;

    /// Creates a record, failing on an existing key. Resolves with the key.
    fn add(&self, key: Option<Value>, value: Value, done: Callback<Value>) -> EngineResult<()>;

    /// Deletes the record at `key`, if any.
    fn delete(&self, key: Value, done: Callback<()>) -> EngineResult<()>;

    /// Deletes every record.
    fn clear(&self, done: Callback<()>) -> EngineResult<()>;

    /// Counts the records in `range`.
    fn count(&self, range: Option<KeyRange>, done: Callback<u64>) -> EngineResult<()>;

    /// Opens a cursor over `range`, visiting records in `direction`.
    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
        step: CursorStep,
    ) -> EngineResult<()>;

    /// Returns an index of this store.
    fn index(&self, name: &str) -> EngineResult<Arc<dyn EngineIndex>>;
}

/// A secondary index as seen through one transaction.
pub trait EngineIndex: Send + Sync {
    /// Index name.
    fn name(&self) -> &str;

    /// Indexed key path.
    fn key_path(&self) -> &str;

    /// Whether index keys are unique.
    fn unique(&self) -> bool;

    /// Whether arrays are indexed per element.
    fn multi_entry(&self) -> bool;

    /// Reads the first record whose index key equals `key`.
    fn get(&self, key: Value, done: Callback<Option<Value>>) -> EngineResult<()>;

    /// Counts index entries in `range`.
    fn count(&self, range: Option<KeyRange>, done: Callback<u64>) -> EngineResult<()>;

    /// Opens a cursor over index entries in `range`.
    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
        step: CursorStep,
    ) -> EngineResult<()>;
}

/// A cursor positioned on one record.
pub trait EngineCursor: Send {
    /// Key at the current position (the index key for index cursors).
    fn key(&self) -> &Value;

    /// Primary key of the current record.
    fn primary_key(&self) -> &Value;

    /// Current record.
    fn value(&self) -> &Value;

    /// Requests the next record. Can be called once per position.
    fn advance(&self) -> EngineResult<()>;
}
