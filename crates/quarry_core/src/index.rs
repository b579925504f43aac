//! Secondary index views.

use crate::cursor::{self, Cursor, CursorOptions};
use crate::error::{CoreError, CoreResult};
use crate::mode::Mode;
use crate::schema::IndexMeta;
use crate::sequencer;
use crate::store::Store;
use quarry_codec::Value;
use quarry_engine::{EngineError, EngineIndex, KeyRange};
use std::fmt;
use std::sync::Arc;

/// Read access to a store through one of its indexes.
///
/// Runs in the same transaction its store would use: the bound
/// transaction, or a short-lived read-only one per call.
#[derive(Clone)]
pub struct Index {
    store: Store,
    meta: Arc<IndexMeta>,
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("store", &self.store.name())
            .field("name", &self.meta.name())
            .field("unique", &self.meta.unique())
            .finish()
    }
}

impl Index {
    pub(crate) fn new(store: Store, meta: Arc<IndexMeta>) -> Self {
        Self { store, meta }
    }

    /// Name of the index.
    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Dotted path of the indexed field.
    pub fn key_path(&self) -> &str {
        self.meta.key_path()
    }

    /// Whether index keys are unique.
    pub fn unique(&self) -> bool {
        self.meta.unique()
    }

    /// Whether array values index each element.
    pub fn multi_entry(&self) -> bool {
        self.meta.multi_entry()
    }

    async fn engine(&self) -> CoreResult<Arc<dyn EngineIndex>> {
        let txn = self.store.scoped(Mode::ReadOnly);
        let (_, store) = self.store.engine(&txn).await?;
        store.index(self.meta.name()).map_err(|err| match err {
            EngineError::NotFound { .. } => CoreError::IndexNotFound {
                store: self.store.name().to_string(),
                name: self.meta.name().to_string(),
            },
            other => other.into(),
        })
    }

    /// Returns the first record whose index key is `key`, lowest primary
    /// key first.
    ///
    /// # Errors
    ///
    /// Fails if `key` is not a valid key or the transaction fails.
    pub async fn get(&self, key: impl Into<Value>) -> CoreResult<Option<Value>> {
        let key = key.into();
        let index = self.engine().await?;
        sequencer::single(|done| index.get(key, done)).await
    }

    /// Returns every record whose index key is `key`, in primary key order.
    ///
    /// # Errors
    ///
    /// Fails if `key` is not a valid key or the transaction fails.
    pub async fn get_matches(&self, key: impl Into<Value>) -> CoreResult<Vec<Value>> {
        let range = KeyRange::only(key)?;
        self.get_all(Some(range)).await
    }

    /// Counts the records whose index key is in `range`, by enumeration.
    ///
    /// A multi-entry index counts a record once per matching element.
    ///
    /// # Errors
    ///
    /// Fails if the transaction fails.
    pub async fn count(&self, range: Option<KeyRange>) -> CoreResult<u64> {
        let index = self.engine().await?;
        cursor::count(|step| index.open_cursor(range, Default::default(), step)).await
    }

    /// Calls `iterator` for each record in `options.range` of index keys.
    /// [`Cursor::key`] is the index key, [`Cursor::primary_key`] the
    /// record's key.
    ///
    /// As with [`Store::cursor`](crate::Store::cursor), returning without
    /// advancing ends the iteration with `Ok(())`.
    ///
    /// # Errors
    ///
    /// Fails if a cursor request fails.
    pub async fn cursor<F>(&self, options: CursorOptions, iterator: F) -> CoreResult<()>
    where
        F: FnMut(&Cursor) + Send + 'static,
    {
        let index = self.engine().await?;
        let CursorOptions { range, direction } = options;
        cursor::iterate(|step| index.open_cursor(range, direction, step), iterator).await
    }

    /// Returns every record in `range` of index keys, ordered by index key
    /// and then primary key.
    ///
    /// # Errors
    ///
    /// Fails if a cursor request fails.
    pub async fn get_all(&self, range: Option<KeyRange>) -> CoreResult<Vec<Value>> {
        let index = self.engine().await?;
        cursor::collect(
            |step| index.open_cursor(range, Default::default(), step),
            |cursor| cursor.value().clone(),
        )
        .await
    }
}
