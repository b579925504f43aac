//! Single-threaded event loop driving futures against the engine.

use super::{CommitPolicy, MemoryEngine};
use crate::error::{EngineError, EngineResult};
use futures_executor::LocalPool;
use futures_util::task::LocalSpawnExt;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use tracing::warn;

impl MemoryEngine {
    /// Runs `future` to completion on the current thread.
    ///
    /// Each turn polls every woken future until none can progress, then
    /// executes one engine event and commits idle transactions (see
    /// [`CommitPolicy`] for the ordering of the two). Transactions still
    /// live when the future finishes stay queued for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stalled`] when the future is still pending
    /// but the engine has nothing left to do, or after `max_ticks` events.
    pub fn run_until<F>(&self, future: F) -> EngineResult<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let mut pool = LocalPool::new();
        let output = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&output);
        pool.spawner()
            .spawn_local(async move {
                let value = future.await;
                *slot.borrow_mut() = Some(value);
            })
            .map_err(|err| EngineError::invalid_state(format!("cannot spawn future: {err}")))?;

        let max_ticks = self.config().max_ticks;
        let mut ticks = 0u64;
        loop {
            pool.run_until_stalled();
            if let Some(value) = output.borrow_mut().take() {
                return Ok(value);
            }
            if ticks >= max_ticks {
                warn!(ticks, "event loop reached its tick limit");
                return Err(EngineError::Stalled);
            }
            ticks += 1;

            let dispatched = self.dispatch_one();
            if dispatched && self.config().commit_policy == CommitPolicy::AfterPoll {
                pool.run_until_stalled();
            }
            let committed = self.finalize_idle();
            if !dispatched && !committed {
                warn!(ticks, "future is pending but the engine is idle");
                return Err(EngineError::Stalled);
            }
        }
    }

    /// Processes engine events until none are left, without polling any
    /// future. Returns the number of events and commits processed.
    pub fn run_pending(&self) -> u64 {
        let mut processed = 0;
        while processed < self.config().max_ticks {
            let dispatched = self.dispatch_one();
            let committed = self.finalize_idle();
            if !dispatched && !committed {
                break;
            }
            processed += 1;
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConfig;
    use crate::traits::{Engine, EngineHandle};
    use futures_channel::oneshot;
    use std::sync::Arc;

    #[test]
    fn ready_future_needs_no_events() {
        let engine = MemoryEngine::new();
        assert_eq!(engine.run_until(async { 7 }).unwrap(), 7);
    }

    #[test]
    fn pending_future_without_work_stalls() {
        let engine = MemoryEngine::new();
        let result = engine.run_until(futures_util::future::pending::<()>());
        assert_eq!(result, Err(EngineError::Stalled));
    }

    #[test]
    fn engine_callbacks_wake_futures() {
        let engine = MemoryEngine::new();
        let (tx, rx) = oneshot::channel();
        engine.open(
            "scratch",
            1,
            Box::new(|_, _| Ok(())),
            Box::new(move |result| {
                let _ = tx.send(result.map(|handle: Arc<dyn EngineHandle>| handle.version()));
            }),
        );
        let version = engine.run_until(rx).unwrap().unwrap();
        assert_eq!(version, Ok(1));
    }

    #[test]
    fn tick_limit_is_enforced() {
        let engine = MemoryEngine::with_config(MemoryConfig::new().max_ticks(0));
        let (_tx, rx) = oneshot::channel::<()>();
        assert_eq!(engine.run_until(rx), Err(EngineError::Stalled));
    }

    #[test]
    fn run_pending_drains_tasks() {
        let engine = MemoryEngine::new();
        engine.open("scratch", 1, Box::new(|_, _| Ok(())), Box::new(|_| {}));
        assert!(engine.run_pending() >= 1);
        assert_eq!(engine.database_version("scratch"), Some(1));
    }
}
