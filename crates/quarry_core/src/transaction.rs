//! Transaction lifecycle.
//!
//! A [`Transaction`] starts without any engine resource. The first call
//! that needs one (a store operation, [`Transaction::get_instance`],
//! [`Transaction::abort`] or awaiting the outcome) acquires a single engine
//! transaction, and every concurrent caller shares that acquisition. The
//! engine later reports exactly one of `complete`, `error` or `abort`; the
//! first report settles the transaction's outcome, and any later report is
//! ignored.
//!
//! ```text
//! close ──> initializing ──> ready ──> complete | error | aborted
//!                 └────────────────────> error
//! ```

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::mode::Mode;
use crate::store::Store;
use futures_channel::oneshot;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use quarry_engine::{EngineError, EngineTransaction};
use std::fmt;
use std::future::IntoFuture;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

type Acquisition = Shared<BoxFuture<'static, CoreResult<Arc<dyn EngineTransaction>>>>;
type Outcome = Shared<BoxFuture<'static, CoreResult<()>>>;
type Listener = Box<dyn FnOnce(Option<&CoreError>) + Send>;

/// Observable state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// No engine transaction was requested yet.
    Close,
    /// The engine transaction is being acquired.
    Initializing,
    /// The engine transaction is live.
    Ready,
    /// Acquisition or a request failed.
    Error,
    /// Committed.
    Complete,
    /// Aborted.
    Aborted,
}

impl TransactionStatus {
    /// Whether the transaction has ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Error | TransactionStatus::Complete | TransactionStatus::Aborted
        )
    }
}

/// Lifecycle event a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The transaction committed.
    Complete,
    /// A request failed or the engine transaction could not be acquired.
    Error,
    /// The transaction was aborted.
    Abort,
}

/// Handle returned by [`Transaction::on`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

enum Phase {
    Close,
    Initializing(Acquisition),
    Ready(Arc<dyn EngineTransaction>),
    Error(CoreError),
    Complete,
    Aborted,
}

impl Phase {
    fn status(&self) -> TransactionStatus {
        match self {
            Phase::Close => TransactionStatus::Close,
            Phase::Initializing(_) => TransactionStatus::Initializing,
            Phase::Ready(_) => TransactionStatus::Ready,
            Phase::Error(_) => TransactionStatus::Error,
            Phase::Complete => TransactionStatus::Complete,
            Phase::Aborted => TransactionStatus::Aborted,
        }
    }
}

enum Terminal {
    Complete,
    Error(CoreError),
    Abort,
}

impl Terminal {
    fn event(&self) -> Event {
        match self {
            Terminal::Complete => Event::Complete,
            Terminal::Error(_) => Event::Error,
            Terminal::Abort => Event::Abort,
        }
    }

    fn result(&self) -> CoreResult<()> {
        match self {
            Terminal::Complete => Ok(()),
            Terminal::Error(err) => Err(err.clone()),
            Terminal::Abort => Err(CoreError::Aborted),
        }
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Event, Listener)>,
}

impl Listeners {
    fn take(&mut self, event: Event) -> Vec<Listener> {
        let (matching, rest) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition::<Vec<_>, _>(|(_, kind, _)| *kind == event);
        self.entries = rest;
        matching.into_iter().map(|(_, _, listener)| listener).collect()
    }
}

struct TransactionInner {
    db: Database,
    scope: Vec<String>,
    mode: Mode,
    phase: Mutex<Phase>,
    listeners: Mutex<Listeners>,
    settle: Mutex<Option<oneshot::Sender<CoreResult<()>>>>,
    outcome: Outcome,
}

/// A unit of work over a fixed set of stores.
///
/// Clones share the same state. A transaction is single-use: once it has
/// ended, create a new one for further work.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("db", &self.inner.db.name())
            .field("scope", &self.inner.scope)
            .field("mode", &self.inner.mode)
            .field("status", &self.status())
            .finish()
    }
}

impl Transaction {
    /// `scope` must be sorted and free of duplicates.
    pub(crate) fn new(db: Database, scope: Vec<String>, mode: Mode) -> Self {
        let (tx, rx) = oneshot::channel();
        let outcome = rx
            .map(|settled| settled.unwrap_or(Err(CoreError::TransactionInactive)))
            .boxed()
            .shared();
        Self {
            inner: Arc::new(TransactionInner {
                db,
                scope,
                mode,
                phase: Mutex::new(Phase::Close),
                listeners: Mutex::new(Listeners::default()),
                settle: Mutex::new(Some(tx)),
                outcome,
            }),
        }
    }

    /// Names of the stores this transaction may touch, sorted.
    pub fn scope(&self) -> &[String] {
        &self.inner.scope
    }

    /// The access mode.
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// The current status.
    pub fn status(&self) -> TransactionStatus {
        self.inner.phase.lock().status()
    }

    /// The database this transaction belongs to.
    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Returns a view of store `name` bound to this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Scope`] if `name` is not in the scope, before
    /// anything reaches the engine, and [`CoreError::StoreNotFound`] if the
    /// schema declares no such store.
    pub fn store(&self, name: &str) -> CoreResult<Store> {
        if self.inner.scope.binary_search_by(|s| s.as_str().cmp(name)).is_err() {
            return Err(CoreError::scope(name));
        }
        let meta = self.inner.db.meta(name)?;
        Ok(Store::new(self.inner.db.clone(), meta, Some(self.clone())))
    }

    /// Returns the engine transaction, acquiring it on first use.
    ///
    /// Concurrent callers share one acquisition; at most one engine
    /// transaction is ever created per `Transaction`.
    ///
    /// # Errors
    ///
    /// The first callers receive the acquisition failure itself. Once the
    /// transaction has failed, every call returns [`CoreError::Transaction`]
    /// wrapping that failure. A completed or aborted transaction returns
    /// [`CoreError::TransactionInactive`].
    pub async fn get_instance(&self) -> CoreResult<Arc<dyn EngineTransaction>> {
        let pending = {
            let mut phase = self.inner.phase.lock();
            match &*phase {
                Phase::Ready(origin) => return Ok(Arc::clone(origin)),
                Phase::Initializing(pending) => pending.clone(),
                Phase::Error(err) => return Err(CoreError::replay(err)),
                Phase::Complete | Phase::Aborted => return Err(CoreError::TransactionInactive),
                Phase::Close => {
                    let pending = self.acquire();
                    *phase = Phase::Initializing(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn acquire(&self) -> Acquisition {
        let weak = Arc::downgrade(&self.inner);
        let db = self.inner.db.clone();
        let scope = self.inner.scope.clone();
        let mode = self.inner.mode;
        async move {
            let result = match db.get_instance().await {
                Ok(handle) => handle
                    .transaction(&scope, mode.into())
                    .map_err(CoreError::from),
                Err(err) => Err(err),
            };
            let Some(inner) = weak.upgrade() else {
                return result;
            };
            let txn = Transaction { inner };
            match result {
                Ok(origin) => {
                    txn.attach(&origin);
                    Ok(origin)
                }
                Err(err) => {
                    debug!(db = %db.name(), ?scope, error = %err, "transaction acquisition failed");
                    txn.finish(Terminal::Error(err.clone()));
                    Err(err)
                }
            }
        }
        .boxed()
        .shared()
    }

    fn attach(&self, origin: &Arc<dyn EngineTransaction>) {
        let weak = Arc::downgrade(&self.inner);
        let complete = weak.clone();
        origin.on_complete(Box::new(move || notify(&complete, Terminal::Complete)));
        let error = weak.clone();
        origin.on_error(Box::new(move |err| notify(&error, Terminal::Error(err.into()))));
        origin.on_abort(Box::new(move || notify(&weak, Terminal::Abort)));

        let mut phase = self.inner.phase.lock();
        if let Phase::Initializing(_) = *phase {
            trace!(
                db = %self.inner.db.name(),
                scope = ?self.inner.scope,
                mode = %self.inner.mode,
                "transaction ready"
            );
            *phase = Phase::Ready(Arc::clone(origin));
        }
    }

    /// Moves to a terminal state, notifies the matching listeners and
    /// settles the outcome. Only the first call has an effect.
    fn finish(&self, terminal: Terminal) {
        {
            let mut phase = self.inner.phase.lock();
            if phase.status().is_terminal() {
                return;
            }
            *phase = match &terminal {
                Terminal::Complete => Phase::Complete,
                Terminal::Error(err) => Phase::Error(err.clone()),
                Terminal::Abort => Phase::Aborted,
            };
        }
        let result = terminal.result();
        debug!(
            db = %self.inner.db.name(),
            scope = ?self.inner.scope,
            event = ?terminal.event(),
            "transaction finished"
        );
        let listeners = self.inner.listeners.lock().take(terminal.event());
        for listener in listeners {
            listener(result.as_ref().err());
        }
        if let Some(tx) = self.inner.settle.lock().take() {
            let _ = tx.send(result);
        }
    }

    /// Subscribes `listener` to `event`.
    ///
    /// The listener receives the error for [`Event::Error`] and
    /// [`Event::Abort`] and `None` for [`Event::Complete`]. Subscribing to
    /// the event that already ended the transaction calls the listener
    /// immediately; subscribing to another event after the end has no
    /// effect.
    pub fn on<F>(&self, event: Event, listener: F) -> ListenerId
    where
        F: FnOnce(Option<&CoreError>) + Send + 'static,
    {
        let ended = {
            let phase = self.inner.phase.lock();
            match &*phase {
                Phase::Complete => Some((Event::Complete, None)),
                Phase::Error(err) => Some((Event::Error, Some(err.clone()))),
                Phase::Aborted => Some((Event::Abort, Some(CoreError::Aborted))),
                _ => None,
            }
        };
        let mut listeners = self.inner.listeners.lock();
        listeners.next_id += 1;
        let id = ListenerId(listeners.next_id);
        match ended {
            None => listeners.entries.push((id, event, Box::new(listener))),
            Some((happened, err)) => {
                drop(listeners);
                if happened == event {
                    listener(err.as_ref());
                }
            }
        }
        id
    }

    /// Removes a listener. Returns `false` if it already ran or was removed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _, _)| *entry != id);
        listeners.entries.len() != before
    }

    /// Aborts the transaction, acquiring it first if needed.
    ///
    /// Queued requests fail with [`CoreError::Aborted`], the outcome
    /// settles as aborted, and only `abort` listeners are notified.
    ///
    /// # Errors
    ///
    /// Fails if the transaction cannot be acquired or has already ended.
    pub async fn abort(&self) -> CoreResult<()> {
        let origin = self.get_instance().await?;
        match origin.abort() {
            Ok(()) => {}
            Err(EngineError::InvalidState { .. }) => return Err(CoreError::TransactionInactive),
            Err(err) => return Err(err.into()),
        }
        self.inner
            .listeners
            .lock()
            .entries
            .retain(|(_, event, _)| *event == Event::Abort);
        self.finish(Terminal::Abort);
        Ok(())
    }

    /// Resolves when the transaction completes and fails when it errors or
    /// aborts. Every call observes the same single outcome.
    ///
    /// A transaction that was never used is acquired first, so awaiting it
    /// cannot hang.
    pub fn done(&self) -> BoxFuture<'static, CoreResult<()>> {
        let txn = self.clone();
        async move {
            if txn.status() == TransactionStatus::Close {
                // a failed acquisition settles the outcome itself
                let _ = txn.get_instance().await;
            }
            txn.inner.outcome.clone().await
        }
        .boxed()
    }
}

fn notify(weak: &Weak<TransactionInner>, terminal: Terminal) {
    if let Some(inner) = weak.upgrade() {
        Transaction { inner }.finish(terminal);
    }
}

impl IntoFuture for Transaction {
    type Output = CoreResult<()>;
    type IntoFuture = BoxFuture<'static, CoreResult<()>>;

    fn into_future(self) -> Self::IntoFuture {
        self.done()
    }
}

impl IntoFuture for &Transaction {
    type Output = CoreResult<()>;
    type IntoFuture = BoxFuture<'static, CoreResult<()>>;

    fn into_future(self) -> Self::IntoFuture {
        self.done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, StoreOptions};
    use quarry_codec::Value;
    use quarry_engine::MemoryEngine;

    fn database(engine: &MemoryEngine) -> Database {
        let schema = Schema::new()
            .version(1)
            .add_store("notes", StoreOptions::new());
        Database::new("scratch", schema, engine.clone()).unwrap()
    }

    #[test]
    fn acquisition_is_shared() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let txn = db.transaction(["notes"], Mode::ReadWrite);
        assert_eq!(txn.status(), TransactionStatus::Close);

        let statuses = engine
            .run_until(async move {
                let (a, b) = futures_util::join!(txn.get_instance(), txn.get_instance());
                assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
                let ready = txn.status();
                txn.done().await.unwrap();
                (ready, txn.status())
            })
            .unwrap();
        assert_eq!(statuses, (TransactionStatus::Ready, TransactionStatus::Complete));
        assert_eq!(engine.stats().transactions_created, 1);
    }

    #[test]
    fn unused_transaction_completes_when_awaited() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let txn = db.transaction(["notes"], Mode::ReadOnly);
        let result = engine.run_until(txn.into_future()).unwrap();
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn failed_acquisition_is_sticky() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let txn = db.transaction(["missing"], Mode::ReadOnly);
        let errors = engine
            .run_until(async move {
                let first = txn.get_instance().await.err();
                let second = txn.get_instance().await.err();
                let outcome = txn.done().await;
                (first, second, outcome, txn.status())
            })
            .unwrap();
        let (first, second, outcome, status) = errors;
        let first = first.unwrap();
        assert!(matches!(first, CoreError::Engine(EngineError::NotFound { .. })));
        assert_eq!(second, Some(CoreError::replay(&first)));
        assert_eq!(outcome, Err(first));
        assert_eq!(status, TransactionStatus::Error);
    }

    #[test]
    fn listeners_fire_once_per_event() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let txn = db.transaction(["notes"], Mode::ReadWrite);
        let events = Arc::new(Mutex::new(Vec::new()));
        for event in [Event::Complete, Event::Error, Event::Abort] {
            let events = Arc::clone(&events);
            txn.on(event, move |err| events.lock().push((event, err.cloned())));
        }
        let removed = txn.on(Event::Complete, |_| panic!("removed listener ran"));
        assert!(txn.off(removed));
        assert!(!txn.off(removed));

        let tx = txn.clone();
        engine
            .run_until(async move {
                tx.store("notes")?.put_at(1, Value::from("one")).await?;
                tx.done().await
            })
            .unwrap()
            .unwrap();
        assert_eq!(*events.lock(), vec![(Event::Complete, None)]);

        let late = Arc::clone(&events);
        txn.on(Event::Complete, move |_| late.lock().push((Event::Complete, None)));
        txn.on(Event::Abort, |_| panic!("abort after complete"));
        assert_eq!(events.lock().len(), 2);
    }

    #[test]
    fn abort_settles_once_and_ignores_engine_echo() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let txn = db.transaction(["notes"], Mode::ReadWrite);
        let completes = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&completes);
        txn.on(Event::Complete, move |_| *sink.lock() += 1);
        let aborts = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&aborts);
        txn.on(Event::Abort, move |_| *sink.lock() += 1);

        let tx = txn.clone();
        let (abort, outcome, again) = engine
            .run_until(async move {
                let abort = tx.abort().await;
                let outcome = tx.done().await;
                let again = tx.abort().await;
                (abort, outcome, again)
            })
            .unwrap();
        engine.run_pending();
        assert_eq!(abort, Ok(()));
        assert_eq!(outcome, Err(CoreError::Aborted));
        assert_eq!(again, Err(CoreError::TransactionInactive));
        assert_eq!(*aborts.lock(), 1);
        assert_eq!(*completes.lock(), 0);
        assert_eq!(txn.status(), TransactionStatus::Aborted);
    }

    #[test]
    fn store_outside_scope_fails_synchronously() {
        let engine = MemoryEngine::new();
        let db = database(&engine);
        let txn = db.transaction(["notes"], Mode::ReadOnly);
        assert_eq!(txn.store("books").unwrap_err(), CoreError::scope("books"));
        assert_eq!(txn.status(), TransactionStatus::Close);
        assert!(engine.is_idle());
    }
}
