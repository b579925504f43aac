//! Transactions, stores, indexes and cursors of the memory engine.

use super::data::{Hit, StoreData};
use super::Shared;
use crate::error::{EngineError, EngineResult};
use crate::range::{to_key, Direction, KeyRange};
use crate::traits::{
    Callback, CursorStep, EngineCursor, EngineIndex, EngineStore, EngineTransaction,
    ErrorListener, Listener,
};
use crate::types::{IndexParams, StoreParams, TransactionMode};
use parking_lot::Mutex;
use quarry_codec::{is_valid_key, Key, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Outcome of an executed request, delivered once the state lock is
/// released.
pub(crate) struct Completion {
    pub(crate) failure: Option<EngineError>,
    pub(crate) notify: Box<dyn FnOnce() + Send>,
}

/// A request waiting in a transaction queue.
pub(crate) struct Request {
    pub(crate) store: String,
    pub(crate) run: Box<dyn FnOnce(&mut StoreData) -> Completion + Send>,
    pub(crate) reject: Box<dyn FnOnce(EngineError) + Send>,
}

impl Request {
    pub(crate) fn new<T, F>(store: &str, done: Callback<T>, op: F) -> Self
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreData) -> EngineResult<T> + Send + 'static,
    {
        // Exactly one of `run` and `reject` is ever called.
        let slot = Arc::new(Mutex::new(Some(done)));
        let fallback = Arc::clone(&slot);
        Self {
            store: store.to_string(),
            run: Box::new(move |data| {
                let result = op(data);
                let failure = result.as_ref().err().cloned();
                Completion {
                    failure,
                    notify: Box::new(move || {
                        let done = slot.lock().take();
                        if let Some(done) = done {
                            done(result);
                        }
                    }),
                }
            }),
            reject: Box::new(move |err| {
                let done = fallback.lock().take();
                if let Some(done) = done {
                    done(Err(err));
                }
            }),
        }
    }
}

/// Engine-side state of a live transaction.
pub(crate) struct TxnData {
    pub(crate) db: String,
    pub(crate) scope: Vec<String>,
    pub(crate) mode: TransactionMode,
    pub(crate) queue: VecDeque<Request>,
    /// Copy of the scoped stores, taken when the first request runs.
    pub(crate) working: Option<BTreeMap<String, StoreData>>,
    pub(crate) on_complete: Vec<Listener>,
    pub(crate) on_error: Vec<ErrorListener>,
    pub(crate) on_abort: Vec<Listener>,
}

impl TxnData {
    pub(crate) fn new(db: String, scope: Vec<String>, mode: TransactionMode) -> Self {
        Self {
            db,
            scope,
            mode,
            queue: VecDeque::new(),
            working: None,
            on_complete: Vec::new(),
            on_error: Vec::new(),
            on_abort: Vec::new(),
        }
    }

    /// Whether `self` must wait for `earlier` to finish before running.
    pub(crate) fn conflicts_with(&self, earlier: &TxnData) -> bool {
        earlier.db == self.db
            && (earlier.mode.is_writable() || self.mode.is_writable())
            && earlier.scope.iter().any(|name| self.scope.contains(name))
    }
}

#[derive(Clone)]
struct TxnRef {
    shared: Arc<Shared>,
    id: u64,
    mode: TransactionMode,
}

impl TxnRef {
    fn enqueue(&self, request: Request) -> EngineResult<()> {
        {
            let mut state = self.shared.state.lock();
            let Some(txn) = state.transactions.get_mut(&self.id) else {
                return Err(EngineError::TransactionInactive);
            };
            txn.queue.push_back(request);
        }
        self.shared.stats.record_request();
        Ok(())
    }

    fn writable(&self) -> EngineResult<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(EngineError::ReadOnly)
        }
    }

    fn with_txn(&self, f: impl FnOnce(&mut TxnData)) {
        let mut state = self.shared.state.lock();
        if let Some(txn) = state.transactions.get_mut(&self.id) {
            f(txn);
        }
    }
}

/// Handle to a transaction of the memory engine.
pub(crate) struct MemoryTransaction {
    txn: TxnRef,
    db: String,
    scope: Vec<String>,
}

impl MemoryTransaction {
    pub(crate) fn new(
        shared: Arc<Shared>,
        id: u64,
        db: String,
        scope: Vec<String>,
        mode: TransactionMode,
    ) -> Self {
        Self {
            txn: TxnRef { shared, id, mode },
            db,
            scope,
        }
    }
}

impl EngineTransaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.txn.mode
    }

    fn scope(&self) -> Vec<String> {
        self.scope.clone()
    }

    fn object_store(&self, name: &str) -> EngineResult<Arc<dyn EngineStore>> {
        if !self.scope.iter().any(|store| store == name) {
            return Err(EngineError::not_found(format!(
                "store '{name}' in transaction scope"
            )));
        }
        let state = self.txn.shared.state.lock();
        if !state.transactions.contains_key(&self.txn.id) {
            return Err(EngineError::invalid_state("transaction has finished"));
        }
        let data = state
            .databases
            .get(&self.db)
            .and_then(|db| db.stores.get(name))
            .ok_or_else(|| EngineError::not_found(format!("store '{name}'")))?;
        Ok(Arc::new(MemoryStore {
            txn: self.txn.clone(),
            name: name.to_string(),
            params: data.params().clone(),
            indexes: data.index_params(),
        }))
    }

    fn on_complete(&self, listener: Listener) {
        self.txn.with_txn(|txn| txn.on_complete.push(listener));
    }

    fn on_error(&self, listener: ErrorListener) {
        self.txn.with_txn(|txn| txn.on_error.push(listener));
    }

    fn on_abort(&self, listener: Listener) {
        self.txn.with_txn(|txn| txn.on_abort.push(listener));
    }

    fn abort(&self) -> EngineResult<()> {
        {
            let mut state = self.txn.shared.state.lock();
            let Some(txn) = state.transactions.remove(&self.txn.id) else {
                return Err(EngineError::invalid_state("transaction already finished"));
            };
            let TxnData {
                queue, on_abort, ..
            } = txn;
            state.tasks.push_back(Box::new(move || {
                for request in queue {
                    (request.reject)(EngineError::Aborted);
                }
                for listener in on_abort {
                    listener();
                }
            }));
        }
        self.txn.shared.stats.record_abort();
        debug!(db = %self.db, txn = self.txn.id, "transaction aborted");
        Ok(())
    }
}

struct MemoryStore {
    txn: TxnRef,
    name: String,
    params: StoreParams,
    indexes: BTreeMap<String, IndexParams>,
}

impl MemoryStore {
    fn write(
        &self,
        key: Option<Value>,
        value: Value,
        overwrite: bool,
        done: Callback<Value>,
    ) -> EngineResult<()> {
        self.txn.writable()?;
        match (&self.params.key_path, &key) {
            (Some(path), Some(_)) => {
                return Err(EngineError::data(format!(
                    "store '{}' reads keys from '{path}'; an explicit key is not allowed",
                    self.name
                )))
            }
            (None, Some(key)) if !is_valid_key(key) => {
                return Err(EngineError::data(format!("{} is not a valid key", key.kind())))
            }
            _ => {}
        }
        self.txn.enqueue(Request::new(&self.name, done, move |data| {
            data.put(key, value, overwrite)
        }))
    }
}

impl EngineStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_path(&self) -> Option<&str> {
        self.params.key_path.as_deref()
    }

    fn auto_increment(&self) -> bool {
        self.params.auto_increment
    }

    fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    fn get(&self, key: Value, done: Callback<Option<Value>>) -> EngineResult<()> {
        let key = to_key(key)?;
        self.txn
            .enqueue(Request::new(&self.name, done, move |data| data.get(&key)))
    }

    fn put(&self, key: Option<Value>, value: Value, done: Callback<Value>) -> EngineResult<()> {
        self.write(key, value, true, done)
    }

    fn add(&self, key: Option<Value>, value: Value, done: Callback<Value>) -> EngineResult<()> {
        self.write(key, value, false, done)
    }

    fn delete(&self, key: Value, done: Callback<()>) -> EngineResult<()> {
        self.txn.writable()?;
        let key = to_key(key)?;
        self.txn
            .enqueue(Request::new(&self.name, done, move |data| data.delete(&key)))
    }

    fn clear(&self, done: Callback<()>) -> EngineResult<()> {
        self.txn.writable()?;
        self.txn.enqueue(Request::new(&self.name, done, |data| {
            data.clear();
            Ok(())
        }))
    }

    fn count(&self, range: Option<KeyRange>, done: Callback<u64>) -> EngineResult<()> {
        self.txn.enqueue(Request::new(&self.name, done, move |data| {
            Ok(data.count(range.as_ref()))
        }))
    }

    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
        step: CursorStep,
    ) -> EngineResult<()> {
        let cursor = Arc::new(CursorState {
            txn: self.txn.clone(),
            store: self.name.clone(),
            index: None,
            range,
            direction,
            step: Mutex::new(step),
        });
        cursor.issue(None)
    }

    fn index(&self, name: &str) -> EngineResult<Arc<dyn EngineIndex>> {
        let params = self.indexes.get(name).ok_or_else(|| {
            EngineError::not_found(format!("index '{name}' on store '{}'", self.name))
        })?;
        Ok(Arc::new(MemoryIndex {
            txn: self.txn.clone(),
            store: self.name.clone(),
            name: name.to_string(),
            params: params.clone(),
        }))
    }
}

struct MemoryIndex {
    txn: TxnRef,
    store: String,
    name: String,
    params: IndexParams,
}

impl EngineIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_path(&self) -> &str {
        &self.params.key_path
    }

    fn unique(&self) -> bool {
        self.params.unique
    }

    fn multi_entry(&self) -> bool {
        self.params.multi_entry
    }

    fn get(&self, key: Value, done: Callback<Option<Value>>) -> EngineResult<()> {
        let key = to_key(key)?;
        let index = self.name.clone();
        self.txn.enqueue(Request::new(&self.store, done, move |data| {
            data.index_get(&index, &key)
        }))
    }

    fn count(&self, range: Option<KeyRange>, done: Callback<u64>) -> EngineResult<()> {
        let index = self.name.clone();
        self.txn.enqueue(Request::new(&self.store, done, move |data| {
            data.index_count(&index, range.as_ref())
        }))
    }

    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
        step: CursorStep,
    ) -> EngineResult<()> {
        let cursor = Arc::new(CursorState {
            txn: self.txn.clone(),
            store: self.store.clone(),
            index: Some(self.name.clone()),
            range,
            direction,
            step: Mutex::new(step),
        });
        cursor.issue(None)
    }
}

struct CursorState {
    txn: TxnRef,
    store: String,
    index: Option<String>,
    range: Option<KeyRange>,
    direction: Direction,
    step: Mutex<CursorStep>,
}

impl CursorState {
    fn issue(self: &Arc<Self>, after: Option<(Key, Key)>) -> EngineResult<()> {
        let state = Arc::clone(self);
        let done: Callback<Option<Hit>> = Box::new(move |result| {
            let position = result.map(|hit| {
                hit.map(|hit| {
                    Box::new(MemoryCursor {
                        state: Arc::clone(&state),
                        hit,
                        advanced: AtomicBool::new(false),
                    }) as Box<dyn EngineCursor>
                })
            });
            let mut step = state.step.lock();
            (*step)(position);
        });
        let index = self.index.clone();
        let range = self.range.clone();
        let direction = self.direction;
        self.txn.enqueue(Request::new(&self.store, done, move |data| {
            data.seek(index.as_deref(), range.as_ref(), direction, after.as_ref())
        }))
    }
}

struct MemoryCursor {
    state: Arc<CursorState>,
    hit: Hit,
    advanced: AtomicBool,
}

impl EngineCursor for MemoryCursor {
    fn key(&self) -> &Value {
        self.hit.key.as_value()
    }

    fn primary_key(&self) -> &Value {
        self.hit.primary_key.as_value()
    }

    fn value(&self) -> &Value {
        &self.hit.value
    }

    fn advance(&self) -> EngineResult<()> {
        if self.advanced.swap(true, Ordering::AcqRel) {
            return Err(EngineError::invalid_state("cursor already advanced"));
        }
        self.state
            .issue(Some((self.hit.key.clone(), self.hit.primary_key.clone())))
    }
}
