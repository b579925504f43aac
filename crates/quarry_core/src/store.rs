//! Store views.

use crate::batch::{Batch, BatchOp};
use crate::cursor::{self, Cursor, CursorOptions};
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::index::Index;
use crate::mode::Mode;
use crate::schema::StoreMeta;
use crate::sequencer::{self, Outcome, Step};
use crate::transaction::Transaction;
use quarry_codec::Value;
use quarry_engine::{EngineError, EngineStore, EngineTransaction, KeyRange};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Operations on one store.
///
/// A store obtained from [`Database::store`] runs every call in its own
/// single-store transaction: reads resolve with their result, writes
/// resolve once that transaction has committed. A store obtained from
/// [`Transaction::store`] runs every call in that transaction; writes
/// resolve when their requests succeed and durability is observed by
/// awaiting the transaction.
#[derive(Clone)]
pub struct Store {
    db: Database,
    meta: Arc<StoreMeta>,
    transaction: Option<Transaction>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("db", &self.db.name())
            .field("name", &self.meta.name())
            .field("bound", &self.transaction.is_some())
            .finish()
    }
}

impl Store {
    pub(crate) fn new(
        db: Database,
        meta: Arc<StoreMeta>,
        transaction: Option<Transaction>,
    ) -> Self {
        Self {
            db,
            meta,
            transaction,
        }
    }

    /// Name of the store.
    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Key path, if records carry their own key.
    pub fn key_path(&self) -> Option<&str> {
        self.meta.key_path()
    }

    /// Whether keys are generated.
    pub fn auto_increment(&self) -> bool {
        self.meta.auto_increment()
    }

    /// Names of the declared indexes, sorted.
    pub fn index_names(&self) -> Vec<&str> {
        self.meta.index_names()
    }

    /// The transaction this view is bound to, if any.
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// Returns index `name` of this store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFound`] if the store declares no such
    /// index.
    pub fn index(&self, name: &str) -> CoreResult<Index> {
        let meta = self.meta.index(name).ok_or_else(|| CoreError::IndexNotFound {
            store: self.meta.name().to_string(),
            name: name.to_string(),
        })?;
        Ok(Index::new(self.clone(), Arc::clone(meta)))
    }

    pub(crate) fn scoped(&self, mode: Mode) -> Transaction {
        match &self.transaction {
            Some(txn) => txn.clone(),
            None => self.db.transaction([self.meta.name()], mode),
        }
    }

    /// Acquires `txn` and opens this store in it.
    pub(crate) async fn engine(
        &self,
        txn: &Transaction,
    ) -> CoreResult<(Arc<dyn EngineTransaction>, Arc<dyn EngineStore>)> {
        let origin = txn.get_instance().await?;
        let store = origin
            .object_store(self.meta.name())
            .map_err(|err| match err {
                EngineError::InvalidState { .. } => CoreError::TransactionInactive,
                other => other.into(),
            })?;
        Ok((origin, store))
    }

    /// Waits for an implicit transaction to commit.
    async fn settle(&self, txn: &Transaction) -> CoreResult<()> {
        if self.transaction.is_some() {
            return Ok(());
        }
        txn.done().await
    }

    /// Aligns an explicit key with the record for stores with a key path.
    ///
    /// A key equal to the one in the record is accepted, a missing key is
    /// written into the record, and a different key is an error.
    fn prepare(&self, key: Option<Value>, mut value: Value) -> CoreResult<(Option<Value>, Value)> {
        value.normalize();
        let (Some(path), Some(key)) = (self.meta.key_path(), key.clone()) else {
            return Ok((key, value));
        };
        match value.get_path(path) {
            Some(existing) if *existing == key => {}
            Some(_) => {
                return Err(CoreError::data(format!(
                    "key does not match the record's '{path}' field"
                )))
            }
            None => value.set_path(path, key)?,
        }
        Ok((None, value))
    }

    /// Reads the record at `key`. `None` means not found.
    ///
    /// # Errors
    ///
    /// Fails if `key` is not a valid key or the transaction fails.
    pub async fn get(&self, key: impl Into<Value>) -> CoreResult<Option<Value>> {
        let key = key.into();
        let txn = self.scoped(Mode::ReadOnly);
        let (_, store) = self.engine(&txn).await?;
        sequencer::single(|done| store.get(key, done)).await
    }

    /// Reads several records in one transaction. The result has one slot
    /// per key, in the order of `keys`.
    ///
    /// # Errors
    ///
    /// Fails with the first failing read.
    pub async fn get_many<K: Into<Value>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> CoreResult<Vec<Option<Value>>> {
        let steps: Vec<Step> = keys.into_iter().map(|key| Step::Get(key.into())).collect();
        if steps.is_empty() {
            return Ok(Vec::new());
        }
        let outcomes = self.run(Mode::ReadOnly, steps).await?;
        Ok(outcomes.into_iter().map(Outcome::into_record).collect())
    }

    async fn run(&self, mode: Mode, steps: Vec<Step>) -> CoreResult<Vec<Outcome>> {
        let txn = self.scoped(mode);
        let (origin, store) = self.engine(&txn).await?;
        let outcomes =
            sequencer::run(self.db.config().request_strategy, origin, store, steps).await?;
        if mode.is_writable() {
            self.settle(&txn).await?;
        }
        Ok(outcomes)
    }

    async fn write(&self, key: Option<Value>, value: Value, overwrite: bool) -> CoreResult<Value> {
        let (key, value) = self.prepare(key, value)?;
        let txn = self.scoped(Mode::ReadWrite);
        let (_, store) = self.engine(&txn).await?;
        let key = sequencer::single(|done| {
            if overwrite {
                store.put(key, value, done)
            } else {
                store.add(key, value, done)
            }
        })
        .await?;
        self.settle(&txn).await?;
        Ok(key)
    }

    /// Creates or replaces a record whose key comes from the key path or
    /// the key generator. Returns the key.
    ///
    /// # Errors
    ///
    /// Fails if no key can be determined or a unique index rejects the
    /// record.
    pub async fn put(&self, value: impl Into<Value>) -> CoreResult<Value> {
        self.write(None, value.into(), true).await
    }

    /// Creates or replaces the record at `key`. Returns the key.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Data`] if the store has a key path and the
    /// record holds a different key.
    pub async fn put_at(
        &self,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> CoreResult<Value> {
        self.write(Some(key.into()), value.into(), true).await
    }

    /// Creates a record whose key comes from the key path or the key
    /// generator. Returns the key.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Constraint`] if the key already exists.
    pub async fn add(&self, value: impl Into<Value>) -> CoreResult<Value> {
        self.write(None, value.into(), false).await
    }

    /// Creates the record at `key`. Returns the key.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Constraint`] if the key already exists.
    pub async fn add_at(
        &self,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> CoreResult<Value> {
        self.write(Some(key.into()), value.into(), false).await
    }

    /// Deletes the record at `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Fails if `key` is not a valid key or the transaction fails.
    pub async fn del(&self, key: impl Into<Value>) -> CoreResult<()> {
        let key = key.into();
        let txn = self.scoped(Mode::ReadWrite);
        let (_, store) = self.engine(&txn).await?;
        sequencer::single(|done| store.delete(key, done)).await?;
        self.settle(&txn).await
    }

    /// Deletes several records in one transaction.
    ///
    /// # Errors
    ///
    /// Fails with the first failing delete; none of the deletes land.
    pub async fn del_many<K: Into<Value>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> CoreResult<()> {
        let steps: Vec<Step> = keys.into_iter().map(|key| Step::Delete(key.into())).collect();
        if steps.is_empty() {
            return Ok(());
        }
        self.run(Mode::ReadWrite, steps).await.map(|_| ())
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Fails if the transaction fails.
    pub async fn clear(&self) -> CoreResult<()> {
        let txn = self.scoped(Mode::ReadWrite);
        let (_, store) = self.engine(&txn).await?;
        sequencer::single(|done| store.clear(done)).await?;
        self.settle(&txn).await
    }

    /// Applies `batch` in order inside one transaction.
    ///
    /// Either every operation lands or none does: after a failure, no
    /// earlier put of the batch is visible.
    ///
    /// # Errors
    ///
    /// Fails with the first failing operation.
    pub async fn batch(&self, batch: impl Into<Batch>) -> CoreResult<()> {
        let batch = batch.into();
        if batch.is_empty() {
            return Ok(());
        }
        let steps = batch
            .into_ops()
            .into_iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => {
                    let (key, value) = self.prepare(key, value)?;
                    Ok(Step::Put { key, value })
                }
                BatchOp::Delete { key } => Ok(Step::Delete(key)),
            })
            .collect::<CoreResult<Vec<_>>>()?;
        let ops = steps.len();
        debug!(store = self.meta.name(), ops, "batch started");
        let result = self.run(Mode::ReadWrite, steps).await;
        match &result {
            Ok(_) => debug!(store = self.meta.name(), ops, "batch finished"),
            Err(err) => debug!(store = self.meta.name(), ops, error = %err, "batch failed"),
        }
        result.map(|_| ())
    }

    /// Counts the records in `range`, or all records.
    ///
    /// Records are enumerated with a cursor, so the cost is linear in the
    /// number of matches.
    ///
    /// # Errors
    ///
    /// Fails if the transaction fails.
    pub async fn count(&self, range: Option<KeyRange>) -> CoreResult<u64> {
        let txn = self.scoped(Mode::ReadOnly);
        let (_, store) = self.engine(&txn).await?;
        cursor::count(|step| store.open_cursor(range, Default::default(), step)).await
    }

    /// Calls `iterator` for each record in `options.range`, in
    /// `options.direction` order. The iteration goes on only while the
    /// iterator calls [`Cursor::advance`].
    ///
    /// An iterator that returns without calling [`Cursor::advance`] or
    /// [`Cursor::stop`] ends the iteration. The returned future then
    /// resolves to `Ok(())` and the transaction no longer waits on the
    /// cursor.
    ///
    /// # Errors
    ///
    /// Fails if a cursor request fails.
    pub async fn cursor<F>(&self, options: CursorOptions, iterator: F) -> CoreResult<()>
    where
        F: FnMut(&Cursor) + Send + 'static,
    {
        let txn = self.scoped(Mode::ReadOnly);
        let (_, store) = self.engine(&txn).await?;
        let CursorOptions { range, direction } = options;
        cursor::iterate(|step| store.open_cursor(range, direction, step), iterator).await
    }

    /// Returns every record in `range`, in key order.
    ///
    /// # Errors
    ///
    /// Fails if a cursor request fails.
    pub async fn get_all(&self, range: Option<KeyRange>) -> CoreResult<Vec<Value>> {
        let txn = self.scoped(Mode::ReadOnly);
        let (_, store) = self.engine(&txn).await?;
        cursor::collect(
            |step| store.open_cursor(range, Default::default(), step),
            |cursor| cursor.value().clone(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, StoreOptions};
    use quarry_engine::MemoryEngine;

    fn database(engine: &MemoryEngine) -> Database {
        let schema = Schema::new()
            .version(1)
            .add_store("books", StoreOptions::new().key_path("isbn"))
            .add_store("storage", StoreOptions::new());
        Database::new("scratch", schema, engine.clone()).unwrap()
    }

    fn book(isbn: i64, title: &str) -> Value {
        Value::object([("isbn", Value::from(isbn)), ("title", Value::from(title))])
    }

    #[test]
    fn prepare_injects_and_checks_keys() {
        let db = database(&MemoryEngine::new());
        let books = db.store("books").unwrap();
        let titled = Value::object([("title", Value::from("Bedrock Nights"))]);

        let (key, value) = books.prepare(Some(Value::from(3)), titled).unwrap();
        assert_eq!(key, None);
        assert_eq!(value, book(3, "Bedrock Nights"));

        let (key, _) = books.prepare(Some(Value::from(3)), value.clone()).unwrap();
        assert_eq!(key, None);
        assert!(matches!(
            books.prepare(Some(Value::from(4)), value.clone()),
            Err(CoreError::Data { .. })
        ));

        let storage = db.store("storage").unwrap();
        let (key, _) = storage.prepare(Some(Value::from("k")), value).unwrap();
        assert_eq!(key, Some(Value::from("k")));
    }

    #[test]
    fn implicit_write_then_read() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let found = engine
            .run_until(async move {
                let books = db.store("books")?;
                let key = books.put(book(1, "Quarry Memories")).await?;
                assert_eq!(key, Value::from(1));
                books.get(1).await
            })
            .unwrap()
            .unwrap();
        assert_eq!(found, Some(book(1, "Quarry Memories")));
        assert_eq!(engine.stats().transactions_committed, 2);
    }

    #[test]
    fn get_many_keeps_input_order() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let found = engine
            .run_until(async move {
                let storage = db.store("storage")?;
                storage.put_at(3, "three").await?;
                storage.put_at(1, "one").await?;
                storage.get_many([3, 2, 1]).await
            })
            .unwrap()
            .unwrap();
        assert_eq!(
            found,
            vec![Some(Value::from("three")), None, Some(Value::from("one"))]
        );
    }

    #[test]
    fn add_rejects_existing_keys() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let result = engine
            .run_until(async move {
                let storage = db.store("storage")?;
                storage.add_at("k", 1).await?;
                storage.add_at("k", 2).await
            })
            .unwrap();
        assert!(matches!(result, Err(CoreError::Constraint { .. })));
    }

    #[test]
    fn unknown_index_is_reported() {
        let db = database(&MemoryEngine::new());
        let err = db.store("books").unwrap().index("byTitle").unwrap_err();
        assert_eq!(
            err,
            CoreError::IndexNotFound {
                store: "books".into(),
                name: "byTitle".into()
            }
        );
    }
}
