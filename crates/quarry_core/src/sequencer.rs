//! Request sequencing.
//!
//! The engine commits a transaction as soon as an event leaves it without
//! a pending request. A unit of work made of several requests therefore
//! issues each request from the completion callback of the previous one:
//! there is never a moment where the first request has finished and the
//! next one is not yet queued. [`RequestStrategy::Pipelined`] issues every
//! request up front instead, for engines without auto-commit.

use crate::config::RequestStrategy;
use crate::error::{CoreError, CoreResult};
use futures_channel::oneshot;
use parking_lot::Mutex;
use quarry_codec::Value;
use quarry_engine::{Callback, EngineResult, EngineStore, EngineTransaction};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// Issues one request now and returns its result as a future.
///
/// `issue` runs before this function returns, so the request is queued in
/// the same turn as the caller.
pub(crate) fn single<T, F>(issue: F) -> impl Future<Output = CoreResult<T>>
where
    T: Send + 'static,
    F: FnOnce(Callback<T>) -> EngineResult<()>,
{
    let (tx, rx) = oneshot::channel();
    let issued = issue(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    async move {
        issued?;
        match rx.await {
            Ok(result) => Ok(result?),
            Err(oneshot::Canceled) => Err(CoreError::Aborted),
        }
    }
}

/// One request of a multi-request unit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Get(Value),
    Put { key: Option<Value>, value: Value },
    Delete(Value),
}

/// Result of one [`Step`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Record(Option<Value>),
    Key(Value),
    Done,
}

impl Outcome {
    pub(crate) fn into_record(self) -> Option<Value> {
        match self {
            Outcome::Record(record) => record,
            Outcome::Key(_) | Outcome::Done => None,
        }
    }
}

fn issue(store: &dyn EngineStore, step: Step, done: Callback<Outcome>) -> EngineResult<()> {
    match step {
        Step::Get(key) => store.get(key, Box::new(move |r| done(r.map(Outcome::Record)))),
        Step::Put { key, value } => {
            store.put(key, value, Box::new(move |r| done(r.map(Outcome::Key))))
        }
        Step::Delete(key) => store.delete(key, Box::new(move |r| done(r.map(|()| Outcome::Done)))),
    }
}

type Settle = Mutex<Option<oneshot::Sender<CoreResult<Vec<Outcome>>>>>;

fn settle(slot: &Settle, result: CoreResult<Vec<Outcome>>) {
    if let Some(tx) = slot.lock().take() {
        let _ = tx.send(result);
    }
}

/// Runs `steps` against `store` and returns their outcomes in step order.
///
/// The first failure settles the unit. A request that fails inside the
/// engine rolls the transaction back by itself; a request the engine
/// refuses to queue after earlier steps were issued aborts the transaction
/// so that none of them commit.
pub(crate) fn run(
    strategy: RequestStrategy,
    origin: Arc<dyn EngineTransaction>,
    store: Arc<dyn EngineStore>,
    steps: Vec<Step>,
) -> impl Future<Output = CoreResult<Vec<Outcome>>> {
    let (tx, rx) = oneshot::channel();
    trace!(store = store.name(), steps = steps.len(), ?strategy, "issuing requests");
    match strategy {
        RequestStrategy::Chained => {
            let chain = Arc::new(Chain {
                origin,
                store,
                pending: Mutex::new(steps.into()),
                outcomes: Mutex::new(Vec::new()),
                done: Mutex::new(Some(tx)),
            });
            chain.next();
        }
        RequestStrategy::Pipelined => pipeline(origin, store, steps, tx),
    }
    async move {
        match rx.await {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(CoreError::Aborted),
        }
    }
}

struct Chain {
    origin: Arc<dyn EngineTransaction>,
    store: Arc<dyn EngineStore>,
    pending: Mutex<VecDeque<Step>>,
    outcomes: Mutex<Vec<Outcome>>,
    done: Settle,
}

impl Chain {
    fn next(self: &Arc<Self>) {
        let step = self.pending.lock().pop_front();
        let Some(step) = step else {
            let outcomes = std::mem::take(&mut *self.outcomes.lock());
            settle(&self.done, Ok(outcomes));
            return;
        };
        let chain = Arc::clone(self);
        let issued = issue(
            self.store.as_ref(),
            step,
            Box::new(move |result| match result {
                Ok(outcome) => {
                    chain.outcomes.lock().push(outcome);
                    chain.next();
                }
                Err(err) => settle(&chain.done, Err(err.into())),
            }),
        );
        if let Err(err) = issued {
            if !self.outcomes.lock().is_empty() {
                let _ = self.origin.abort();
            }
            settle(&self.done, Err(err.into()));
        }
    }
}

struct Pipeline {
    slots: Mutex<(Vec<Option<Outcome>>, usize)>,
    done: Settle,
}

fn pipeline(
    origin: Arc<dyn EngineTransaction>,
    store: Arc<dyn EngineStore>,
    steps: Vec<Step>,
    tx: oneshot::Sender<CoreResult<Vec<Outcome>>>,
) {
    let total = steps.len();
    let state = Arc::new(Pipeline {
        slots: Mutex::new((vec![None; total], total)),
        done: Mutex::new(Some(tx)),
    });
    if total == 0 {
        settle(&state.done, Ok(Vec::new()));
        return;
    }
    for (position, step) in steps.into_iter().enumerate() {
        let shared = Arc::clone(&state);
        let issued = issue(
            store.as_ref(),
            step,
            Box::new(move |result| match result {
                Ok(outcome) => {
                    let finished = {
                        let mut slots = shared.slots.lock();
                        slots.0[position] = Some(outcome);
                        slots.1 -= 1;
                        if slots.1 == 0 {
                            Some(std::mem::take(&mut slots.0))
                        } else {
                            None
                        }
                    };
                    if let Some(outcomes) = finished {
                        settle(&shared.done, Ok(outcomes.into_iter().flatten().collect()));
                    }
                }
                Err(err) => settle(&shared.done, Err(err.into())),
            }),
        );
        if let Err(err) = issued {
            if position > 0 {
                let _ = origin.abort();
            }
            settle(&state.done, Err(err.into()));
            return;
        }
    }
}
