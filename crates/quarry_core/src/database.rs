//! Database handle.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::mode::Mode;
use crate::schema::{Schema, StoreMeta};
use crate::store::Store;
use crate::transaction::Transaction;
use futures_channel::oneshot;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use quarry_engine::{Engine, EngineError, EngineHandle};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

type PendingOpen = Shared<BoxFuture<'static, CoreResult<Arc<dyn EngineHandle>>>>;

/// Connection state of a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    /// Not opened yet.
    Unopened,
    /// The engine open is in flight.
    Opening,
    /// The engine handle is available.
    Open,
    /// The open failed; the failure is replayed to every caller.
    Failed,
    /// Closed by [`Database::close`].
    Closed,
}

enum Connection {
    Unopened,
    Opening(PendingOpen),
    Open(Arc<dyn EngineHandle>),
    Failed(CoreError),
    Closed,
}

impl Connection {
    fn status(&self) -> DatabaseStatus {
        match self {
            Connection::Unopened => DatabaseStatus::Unopened,
            Connection::Opening(_) => DatabaseStatus::Opening,
            Connection::Open(_) => DatabaseStatus::Open,
            Connection::Failed(_) => DatabaseStatus::Failed,
            Connection::Closed => DatabaseStatus::Closed,
        }
    }
}

struct DatabaseInner {
    name: String,
    schema: Schema,
    stores: BTreeMap<String, Arc<StoreMeta>>,
    engine: Arc<dyn Engine>,
    config: Config,
    connection: Mutex<Connection>,
}

/// A named, versioned database on an engine.
///
/// The engine handle is opened lazily by the first operation that needs
/// it and shared by every transaction afterwards. Clones share the same
/// connection.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("version", &self.version())
            .field("status", &self.status())
            .finish()
    }
}

impl Database {
    /// Creates a database with the default configuration.
    ///
    /// Nothing reaches the engine until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] if the schema is inconsistent.
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        engine: impl Engine + 'static,
    ) -> CoreResult<Self> {
        Self::with_config(name, schema, engine, Config::default())
    }

    /// Creates a database with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] if the schema is inconsistent.
    pub fn with_config(
        name: impl Into<String>,
        schema: Schema,
        engine: impl Engine + 'static,
        config: Config,
    ) -> CoreResult<Self> {
        schema.validate()?;
        let stores = schema
            .stores()
            .map(|meta| (meta.name().to_string(), Arc::new(meta.clone())))
            .collect();
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                name: name.into(),
                schema,
                stores,
                engine: Arc::new(engine),
                config,
                connection: Mutex::new(Connection::Unopened),
            }),
        })
    }

    /// Name of the database.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Version the database is opened at: the latest schema version.
    pub fn version(&self) -> u32 {
        self.inner.schema.latest_version()
    }

    /// Names of the declared stores, sorted.
    pub fn store_names(&self) -> Vec<&str> {
        self.inner.stores.keys().map(String::as_str).collect()
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The connection state.
    pub fn status(&self) -> DatabaseStatus {
        self.inner.connection.lock().status()
    }

    pub(crate) fn meta(&self, name: &str) -> CoreResult<Arc<StoreMeta>> {
        self.inner
            .stores
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::store_not_found(name))
    }

    /// Returns the engine handle, opening it on first use.
    ///
    /// Concurrent callers share one open. A failed open is not retried:
    /// every later call returns the same failure.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Open`] if the engine rejects the open or the
    /// upgrade, and [`CoreError::Closed`] after [`Database::close`].
    pub async fn get_instance(&self) -> CoreResult<Arc<dyn EngineHandle>> {
        let pending = {
            let mut connection = self.inner.connection.lock();
            match &*connection {
                Connection::Open(handle) => return Ok(Arc::clone(handle)),
                Connection::Failed(err) => return Err(err.clone()),
                Connection::Closed => return Err(CoreError::Closed),
                Connection::Opening(pending) => pending.clone(),
                Connection::Unopened => {
                    let pending = self.start_open();
                    *connection = Connection::Opening(pending.clone());
                    pending
                }
            }
        };
        let result = pending.await;

        let mut connection = self.inner.connection.lock();
        let opening = matches!(*connection, Connection::Opening(_));
        let closed = matches!(*connection, Connection::Closed);
        match &result {
            Ok(handle) if opening => *connection = Connection::Open(Arc::clone(handle)),
            Err(err) if opening => *connection = Connection::Failed(err.clone()),
            Ok(handle) if closed => {
                // closed while the open was in flight
                handle.close();
                return Err(CoreError::Closed);
            }
            _ => {}
        }
        result
    }

    fn start_open(&self) -> PendingOpen {
        let name = self.inner.name.clone();
        let version = self.version();
        debug!(db = %name, version, "opening database");
        let (tx, rx) = oneshot::channel();
        self.inner.engine.open(
            &name,
            version,
            self.inner.schema.upgrade_hook(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        async move {
            let source = match rx.await {
                Ok(Ok(handle)) => {
                    debug!(db = %name, version = handle.version(), "database opened");
                    return Ok(handle);
                }
                Ok(Err(source)) => source,
                Err(oneshot::Canceled) => EngineError::invalid_state("open request was dropped"),
            };
            warn!(db = %name, error = %source, "database open failed");
            Err(CoreError::Open { name, source })
        }
        .boxed()
        .shared()
    }

    /// Returns a view of store `name` that opens a short-lived transaction
    /// for every operation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreNotFound`] if the schema declares no such
    /// store.
    pub fn store(&self, name: &str) -> CoreResult<Store> {
        Ok(Store::new(self.clone(), self.meta(name)?, None))
    }

    /// Creates a transaction over `scope`.
    ///
    /// `mode` defaults to [`Config::default_mode`]. Nothing reaches the
    /// engine until the transaction is first used.
    pub fn transaction<I, S>(&self, scope: I, mode: impl Into<Option<Mode>>) -> Transaction
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scope: Vec<String> = scope.into_iter().map(Into::into).collect();
        scope.sort();
        scope.dedup();
        let mode = mode.into().unwrap_or(self.inner.config.default_mode);
        Transaction::new(self.clone(), scope, mode)
    }

    /// Closes the engine handle. Every later operation fails with
    /// [`CoreError::Closed`]; transactions already acquired keep running.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.inner.connection.lock(), Connection::Closed);
        if let Connection::Open(handle) = previous {
            handle.close();
        }
        debug!(db = %self.inner.name, "database closed");
    }

    /// Closes the database, then deletes it from the engine.
    ///
    /// # Errors
    ///
    /// Fails if the engine refuses the deletion, for example because
    /// another connection is still open.
    pub async fn del(&self) -> CoreResult<()> {
        self.close();
        let (tx, rx) = oneshot::channel();
        self.inner.engine.delete_database(
            &self.inner.name,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        match rx.await {
            Ok(result) => {
                result?;
                debug!(db = %self.inner.name, "database deleted");
                Ok(())
            }
            Err(oneshot::Canceled) => {
                Err(EngineError::invalid_state("delete request was dropped").into())
            }
        }
    }
}
