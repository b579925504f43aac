//! Connections and upgrades.

use super::data::StoreData;
use super::transaction::{MemoryTransaction, TxnData};
use super::{DatabaseData, Shared, State};
use crate::error::{EngineError, EngineResult};
use crate::traits::{EngineHandle, EngineTransaction, UpgradeHook, VersionChange};
use crate::types::{IndexParams, StoreParams, TransactionMode};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Opens `name`, upgrading it first when `version` is newer than the
/// stored one. The hook runs on a draft copy of the stores with the state
/// unlocked; the draft replaces the stores only if the hook succeeds.
pub(super) fn open_database(
    shared: &Arc<Shared>,
    name: &str,
    version: u32,
    upgrade: UpgradeHook,
) -> EngineResult<Arc<dyn EngineHandle>> {
    if version == 0 {
        return Err(EngineError::invalid_access("version must be at least 1"));
    }
    let mut draft = {
        let mut state = shared.state.lock();
        let stored = state.databases.get(name).map_or(0, |db| db.version);
        if version < stored {
            return Err(EngineError::Version {
                requested: version,
                stored,
            });
        }
        if version == stored {
            return Ok(connect(shared, &mut state, name, version));
        }
        if state.is_busy(name) {
            return Err(EngineError::Blocked {
                name: name.to_string(),
            });
        }
        MemoryVersionChange {
            old_version: stored,
            new_version: version,
            stores: state
                .databases
                .get(name)
                .map(|db| db.stores.clone())
                .unwrap_or_default(),
        }
    };

    let old_version = draft.old_version;
    debug!(db = name, from = old_version, to = version, "running upgrade");
    upgrade(&mut draft, old_version).map_err(|err| {
        warn!(db = name, error = %err, "upgrade failed");
        EngineError::upgrade(err.to_string())
    })?;

    let mut state = shared.state.lock();
    if state.is_busy(name) {
        return Err(EngineError::Blocked {
            name: name.to_string(),
        });
    }
    state.databases.insert(
        name.to_string(),
        DatabaseData {
            version,
            stores: draft.stores,
            connections: HashSet::new(),
        },
    );
    shared.stats.record_upgrade();
    Ok(connect(shared, &mut state, name, version))
}

fn connect(
    shared: &Arc<Shared>,
    state: &mut State,
    name: &str,
    version: u32,
) -> Arc<dyn EngineHandle> {
    let connection = state.allocate_id();
    if let Some(db) = state.databases.get_mut(name) {
        db.connections.insert(connection);
    }
    shared.stats.record_open();
    debug!(db = name, version, connection, "database opened");
    Arc::new(MemoryHandle {
        shared: Arc::clone(shared),
        name: name.to_string(),
        version,
        connection,
        closed: AtomicBool::new(false),
    })
}

/// Draft of a database's stores during an upgrade.
struct MemoryVersionChange {
    old_version: u32,
    new_version: u32,
    stores: BTreeMap<String, StoreData>,
}

impl MemoryVersionChange {
    fn store_mut(&mut self, name: &str) -> EngineResult<&mut StoreData> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| EngineError::not_found(format!("store '{name}'")))
    }
}

impl VersionChange for MemoryVersionChange {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn new_version(&self) -> u32 {
        self.new_version
    }

    fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn create_store(&mut self, name: &str, params: StoreParams) -> EngineResult<()> {
        if self.stores.contains_key(name) {
            return Err(EngineError::constraint(format!("store '{name}' already exists")));
        }
        if params.key_path.as_deref() == Some("") {
            return Err(EngineError::invalid_access(format!(
                "store '{name}' has an empty key path"
            )));
        }
        trace!(store = name, "creating store");
        self.stores.insert(name.to_string(), StoreData::new(params));
        Ok(())
    }

    fn delete_store(&mut self, name: &str) -> EngineResult<()> {
        self.stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("store '{name}'")))
    }

    fn create_index(&mut self, store: &str, name: &str, params: IndexParams) -> EngineResult<()> {
        trace!(store, index = name, "creating index");
        self.store_mut(store)?.create_index(name, params)
    }

    fn delete_index(&mut self, store: &str, name: &str) -> EngineResult<()> {
        self.store_mut(store)?.delete_index(name)
    }
}

/// A connection to a database of the memory engine.
struct MemoryHandle {
    shared: Arc<Shared>,
    name: String,
    version: u32,
    connection: u64,
    closed: AtomicBool,
}

impl EngineHandle for MemoryHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .databases
            .get(&self.name)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn transaction(
        &self,
        scope: &[String],
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn EngineTransaction>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        if scope.is_empty() {
            return Err(EngineError::invalid_access("transaction scope is empty"));
        }
        if mode == TransactionMode::VersionChange {
            return Err(EngineError::invalid_access(
                "version-change transactions are only created by open",
            ));
        }
        let mut scope = scope.to_vec();
        scope.sort();
        scope.dedup();

        let id = {
            let mut state = self.shared.state.lock();
            let db = state
                .databases
                .get(&self.name)
                .ok_or_else(|| EngineError::not_found(format!("database '{}'", self.name)))?;
            if let Some(missing) = scope.iter().find(|store| !db.stores.contains_key(*store)) {
                return Err(EngineError::not_found(format!("store '{missing}'")));
            }
            let id = state.allocate_id();
            state
                .transactions
                .insert(id, TxnData::new(self.name.clone(), scope.clone(), mode));
            id
        };
        self.shared.stats.record_transaction();
        trace!(db = %self.name, txn = id, ?scope, %mode, "transaction created");
        Ok(Arc::new(MemoryTransaction::new(
            Arc::clone(&self.shared),
            id,
            self.name.clone(),
            scope,
            mode,
        )))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(db) = self.shared.state.lock().databases.get_mut(&self.name) {
            db.connections.remove(&self.connection);
        }
        debug!(db = %self.name, connection = self.connection, "connection closed");
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.close();
    }
}
