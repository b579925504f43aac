//! Cursor sessions.

use crate::error::{CoreError, CoreResult};
use futures_channel::oneshot;
use parking_lot::Mutex;
use quarry_codec::Value;
use quarry_engine::{CursorStep, Direction, EngineCursor, EngineError, EngineResult, KeyRange};
use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;

/// Range and direction of a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorOptions {
    /// Keys to visit; `None` visits every key.
    pub range: Option<KeyRange>,
    /// Visiting order.
    pub direction: Direction,
}

impl CursorOptions {
    /// Visits every key in ascending order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the cursor to `range`.
    #[must_use]
    pub fn range(mut self, range: KeyRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Sets the visiting order.
    #[must_use]
    pub const fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Restricts the cursor to the range described by `value`, see
    /// [`KeyRange::parse`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Data`] if `value` describes no valid range.
    pub fn range_value(self, value: &Value) -> CoreResult<Self> {
        Ok(self.range(KeyRange::parse(value)?))
    }
}

/// Ends a cursor session exactly once.
struct Session {
    done: Mutex<Option<oneshot::Sender<CoreResult<()>>>>,
}

impl Session {
    fn end(&self, result: CoreResult<()>) {
        if let Some(tx) = self.done.lock().take() {
            let _ = tx.send(result);
        }
    }

    fn is_ended(&self) -> bool {
        self.done.lock().is_none()
    }
}

/// The record a cursor is positioned on, handed to the iterator.
///
/// The iteration continues only if the iterator calls [`Cursor::advance`];
/// returning without advancing ends it, like [`Cursor::stop`].
pub struct Cursor {
    inner: Box<dyn EngineCursor>,
    session: Arc<Session>,
    advanced: Cell<bool>,
}

impl Cursor {
    /// Key of the current position: the primary key for store cursors,
    /// the index key for index cursors.
    pub fn key(&self) -> &Value {
        self.inner.key()
    }

    /// Primary key of the current record.
    pub fn primary_key(&self) -> &Value {
        self.inner.primary_key()
    }

    /// The current record.
    pub fn value(&self) -> &Value {
        self.inner.value()
    }

    /// Requests the next record. The request is issued immediately so the
    /// transaction stays alive.
    ///
    /// Does nothing once the iteration was stopped.
    ///
    /// # Errors
    ///
    /// Fails if the cursor was already advanced at this position, or if the
    /// engine refuses the request; the latter also ends the iteration.
    pub fn advance(&self) -> CoreResult<()> {
        if self.session.is_ended() {
            return Ok(());
        }
        if self.advanced.replace(true) {
            return Err(EngineError::invalid_state("cursor already advanced").into());
        }
        self.inner.advance().map_err(|err| {
            let err = CoreError::from(err);
            self.session.end(Err(err.clone()));
            err
        })
    }

    /// Ends the iteration after this record.
    pub fn stop(&self) {
        self.session.end(Ok(()));
    }
}

/// Opens a cursor through `open` and feeds each position to `iterator`.
///
/// The returned future resolves when the range is exhausted, the iterator
/// stops, or a request fails.
pub(crate) fn iterate<O, F>(open: O, mut iterator: F) -> impl Future<Output = CoreResult<()>>
where
    O: FnOnce(CursorStep) -> EngineResult<()>,
    F: FnMut(&Cursor) + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let session = Arc::new(Session {
        done: Mutex::new(Some(tx)),
    });
    let shared = Arc::clone(&session);
    let step: CursorStep = Box::new(move |position| match position {
        Ok(Some(inner)) => {
            if shared.is_ended() {
                return;
            }
            let cursor = Cursor {
                inner,
                session: Arc::clone(&shared),
                advanced: Cell::new(false),
            };
            iterator(&cursor);
            if !cursor.advanced.get() {
                shared.end(Ok(()));
            }
        }
        Ok(None) => shared.end(Ok(())),
        Err(err) => shared.end(Err(err.into())),
    });
    let opened = open(step);
    if let Err(err) = &opened {
        session.end(Err(err.clone().into()));
    }
    async move {
        match rx.await {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(CoreError::TransactionInactive),
        }
    }
}

/// Collects `extract(cursor)` for every position, in visiting order.
pub(crate) fn collect<O, X>(open: O, extract: X) -> impl Future<Output = CoreResult<Vec<Value>>>
where
    O: FnOnce(CursorStep) -> EngineResult<()>,
    X: Fn(&Cursor) -> Value + Send + 'static,
{
    let items = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&items);
    let done = iterate(open, move |cursor| {
        sink.lock().push(extract(cursor));
        let _ = cursor.advance();
    });
    async move {
        done.await?;
        let collected = std::mem::take(&mut *items.lock());
        Ok(collected)
    }
}

/// Counts the positions of a cursor.
pub(crate) fn count<O>(open: O) -> impl Future<Output = CoreResult<u64>>
where
    O: FnOnce(CursorStep) -> EngineResult<()>,
{
    let total = Arc::new(Mutex::new(0u64));
    let sink = Arc::clone(&total);
    let done = iterate(open, move |cursor| {
        *sink.lock() += 1;
        let _ = cursor.advance();
    });
    async move {
        done.await?;
        let counted = *total.lock();
        Ok(counted)
    }
}
