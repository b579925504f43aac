//! In-process engine.
//!
//! `MemoryEngine` behaves like a browser object store: requests are queued
//! and executed one event at a time, and a transaction commits by itself
//! as soon as an event leaves it without pending requests. Events are
//! executed by [`MemoryEngine::dispatch_one`] and idle transactions are
//! committed by [`MemoryEngine::finalize_idle`]; [`MemoryEngine::run_until`]
//! interleaves both with polling a future.

mod data;
mod event_loop;
mod handle;
mod stats;
mod transaction;

pub use stats::{EngineStats, StatsSnapshot};

use crate::error::EngineError;
use crate::traits::{Callback, Engine, EngineHandle, UpgradeHook};
use data::StoreData;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use transaction::{Completion, Request, TxnData};

/// When idle transactions are committed relative to future polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Commit right after the event that left a transaction idle, before
    /// any woken future runs. A request issued after an `.await` on a
    /// previous result finds the transaction already committed.
    #[default]
    Eager,
    /// Poll woken futures first, then commit. Sequential awaits inside one
    /// transaction keep it alive.
    AfterPoll,
}

/// Configuration of a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Commit timing.
    pub commit_policy: CommitPolicy,
    /// Upper bound on events processed by one `run_until` call.
    pub max_ticks: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            commit_policy: CommitPolicy::Eager,
            max_ticks: 1_000_000,
        }
    }
}

impl MemoryConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the commit policy.
    #[must_use]
    pub const fn commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    /// Sets the event limit of `run_until`.
    #[must_use]
    pub const fn max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = ticks;
        self
    }
}

type Task = Box<dyn FnOnce() + Send>;

struct DatabaseData {
    version: u32,
    stores: BTreeMap<String, StoreData>,
    connections: HashSet<u64>,
}

#[derive(Default)]
pub(crate) struct State {
    databases: HashMap<String, DatabaseData>,
    tasks: VecDeque<Task>,
    transactions: BTreeMap<u64, TxnData>,
    next_id: u64,
}

enum Step {
    Task(Task),
    Request { id: u64, completion: Completion },
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// A transaction waits for every earlier live transaction it conflicts
    /// with.
    fn is_blocked(&self, id: u64, txn: &TxnData) -> bool {
        self.transactions
            .range(..id)
            .any(|(_, earlier)| txn.conflicts_with(earlier))
    }

    fn is_busy(&self, db: &str) -> bool {
        self.databases
            .get(db)
            .is_some_and(|data| !data.connections.is_empty())
            || self.transactions.values().any(|txn| txn.db == db)
    }

    fn next_step(&mut self) -> Option<Step> {
        if let Some(task) = self.tasks.pop_front() {
            return Some(Step::Task(task));
        }
        let id = self
            .transactions
            .iter()
            .find(|(id, txn)| !txn.queue.is_empty() && !self.is_blocked(**id, txn))
            .map(|(id, _)| *id)?;

        let State {
            databases,
            transactions,
            ..
        } = self;
        let txn = transactions.get_mut(&id)?;
        if txn.working.is_none() {
            let stores = databases.get(&txn.db).map(|db| {
                txn.scope
                    .iter()
                    .filter_map(|name| db.stores.get(name).map(|data| (name.clone(), data.clone())))
                    .collect::<BTreeMap<_, _>>()
            });
            trace!(db = %txn.db, txn = id, mode = %txn.mode, "transaction started");
            txn.working = Some(stores.unwrap_or_default());
        }
        let Request { store, run, reject } = txn.queue.pop_front()?;
        let data = txn.working.as_mut().and_then(|working| working.get_mut(&store));
        let completion = match data {
            Some(data) => run(data),
            None => {
                let err = EngineError::not_found(format!("store '{store}'"));
                Completion {
                    failure: Some(err.clone()),
                    notify: Box::new(move || reject(err)),
                }
            }
        };
        Some(Step::Request { id, completion })
    }

    /// Removes every transaction that can commit now, applying writes.
    fn take_idle(&mut self) -> Vec<(u64, TxnData)> {
        let ids: Vec<u64> = self.transactions.keys().copied().collect();
        let mut finished = Vec::new();
        for id in ids {
            let idle = self
                .transactions
                .get(&id)
                .is_some_and(|txn| txn.queue.is_empty() && !self.is_blocked(id, txn));
            if !idle {
                continue;
            }
            let Some(mut txn) = self.transactions.remove(&id) else {
                continue;
            };
            if let Some(working) = txn.working.take() {
                if txn.mode.is_writable() {
                    if let Some(db) = self.databases.get_mut(&txn.db) {
                        db.stores.extend(working);
                    }
                }
            }
            finished.push((id, txn));
        }
        finished
    }
}

pub(crate) struct Shared {
    config: MemoryConfig,
    state: Mutex<State>,
    stats: EngineStats,
}

impl Shared {
    fn push_task(&self, task: Task) {
        self.state.lock().tasks.push_back(task);
    }

    /// Rolls back after a failed request: `error`, then queued requests
    /// fail with `Aborted`, then `abort`.
    fn fail_transaction(&self, id: u64, err: EngineError) {
        let removed = self.state.lock().transactions.remove(&id);
        let Some(txn) = removed else {
            return;
        };
        self.stats.record_abort();
        debug!(db = %txn.db, txn = id, error = %err, "request failed, transaction rolled back");
        let TxnData {
            queue,
            on_error,
            on_abort,
            ..
        } = txn;
        for listener in on_error {
            listener(err.clone());
        }
        for request in queue {
            (request.reject)(EngineError::Aborted);
        }
        for listener in on_abort {
            listener();
        }
    }
}

/// An in-memory object-store engine with auto-committing transactions.
///
/// Clones share the same databases.
#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("config", &self.shared.config)
            .field("stats", &self.shared.stats.snapshot())
            .finish()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Creates an engine with `config`.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State::default()),
                stats: EngineStats::default(),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MemoryConfig {
        &self.shared.config
    }

    /// Returns the engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stored version of database `name`, if it exists.
    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.shared.state.lock().databases.get(name).map(|db| db.version)
    }

    /// Whether nothing is queued and no transaction is live.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock();
        state.tasks.is_empty() && state.transactions.is_empty()
    }

    /// Executes one pending event. Returns `false` if there was none.
    ///
    /// Callbacks run after the engine state is unlocked, so they may issue
    /// further requests.
    pub fn dispatch_one(&self) -> bool {
        let step = self.shared.state.lock().next_step();
        match step {
            None => false,
            Some(Step::Task(task)) => {
                task();
                true
            }
            Some(Step::Request { id, completion }) => {
                let Completion { failure, notify } = completion;
                notify();
                if let Some(err) = failure {
                    self.shared.fail_transaction(id, err);
                }
                true
            }
        }
    }

    /// Commits every transaction without pending requests, oldest first.
    /// Returns `false` if none committed.
    pub fn finalize_idle(&self) -> bool {
        let finished = self.shared.state.lock().take_idle();
        let committed = !finished.is_empty();
        for (id, txn) in finished {
            self.shared.stats.record_commit();
            debug!(db = %txn.db, txn = id, mode = %txn.mode, "transaction committed");
            for listener in txn.on_complete {
                listener();
            }
        }
        committed
    }
}

impl Engine for MemoryEngine {
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeHook,
        done: Callback<Arc<dyn EngineHandle>>,
    ) {
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        self.shared.push_task(Box::new(move || {
            done(handle::open_database(&shared, &name, version, upgrade));
        }));
    }

    fn delete_database(&self, name: &str, done: Callback<()>) {
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        self.shared.push_task(Box::new(move || {
            let result = {
                let mut state = shared.state.lock();
                if state.is_busy(&name) {
                    Err(EngineError::Blocked { name: name.clone() })
                } else {
                    state.databases.remove(&name);
                    Ok(())
                }
            };
            match &result {
                Ok(()) => debug!(db = %name, "database deleted"),
                Err(err) => debug!(db = %name, error = %err, "database deletion refused"),
            }
            done(result);
        }));
    }
}
