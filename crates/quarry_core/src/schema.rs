//! Declarative, versioned schema.
//!
//! A [`Schema`] records the store and index declarations of every version
//! in order. It serves two purposes: the latest state gives the store and
//! index metadata used by [`Store`](crate::Store) and [`Index`](crate::Index),
//! and the recorded history is replayed as the engine's upgrade hook.
//!
//! ```rust
//! use quarry_core::{IndexOptions, Schema, StoreOptions};
//!
//! let schema = Schema::new()
//!     .version(1)
//!     .add_store("books", StoreOptions::new().key_path("isbn"))
//!     .add_index("byTitle", "title", IndexOptions::new().unique(true))
//!     .version(2)
//!     .get_store("books")
//!     .add_index("byYear", "year", IndexOptions::new());
//!
//! assert!(schema.validate().is_ok());
//! assert_eq!(schema.latest_version(), 2);
//! assert_eq!(schema.store("books").unwrap().index_names(), vec!["byTitle", "byYear"]);
//! ```

use crate::error::{CoreError, CoreResult};
use quarry_engine::{IndexParams, StoreParams, UpgradeHook, VersionChange};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Options of a declared store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Dotted path of the key inside each record.
    pub key_path: Option<String>,
    /// Whether missing keys are generated.
    pub auto_increment: bool,
}

impl StoreOptions {
    /// Options of a store with explicit keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads record keys from `path`.
    #[must_use]
    pub fn key_path(mut self, path: impl Into<String>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Generates keys for records that have none.
    #[must_use]
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }
}

/// Options of a declared index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// At most one record per index key.
    pub unique: bool,
    /// Array values index each element separately.
    pub multi_entry: bool,
}

impl IndexOptions {
    /// Options of a plain, non-unique index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets uniqueness.
    #[must_use]
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Sets multi-entry indexing.
    #[must_use]
    pub const fn multi_entry(mut self, value: bool) -> Self {
        self.multi_entry = value;
        self
    }
}

/// Metadata of a declared index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    name: String,
    key_path: String,
    options: IndexOptions,
}

impl IndexMeta {
    /// Name of the index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted path of the indexed field.
    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Whether index keys are unique.
    pub fn unique(&self) -> bool {
        self.options.unique
    }

    /// Whether array values are indexed per element.
    pub fn multi_entry(&self) -> bool {
        self.options.multi_entry
    }
}

/// Metadata of a declared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMeta {
    name: String,
    options: StoreOptions,
    indexes: BTreeMap<String, Arc<IndexMeta>>,
}

impl StoreMeta {
    /// Name of the store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key path, if records carry their own key.
    pub fn key_path(&self) -> Option<&str> {
        self.options.key_path.as_deref()
    }

    /// Whether keys are generated.
    pub fn auto_increment(&self) -> bool {
        self.options.auto_increment
    }

    /// Metadata of index `name`.
    pub fn index(&self, name: &str) -> Option<&Arc<IndexMeta>> {
        self.indexes.get(name)
    }

    /// Names of the declared indexes, sorted.
    pub fn index_names(&self) -> Vec<&str> {
        self.indexes.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    CreateStore {
        name: String,
        options: StoreOptions,
    },
    DeleteStore {
        name: String,
    },
    CreateIndex {
        store: String,
        name: String,
        key_path: String,
        options: IndexOptions,
    },
    DeleteIndex {
        store: String,
        name: String,
    },
}

impl Change {
    fn apply(&self, change: &mut dyn VersionChange) -> quarry_engine::EngineResult<()> {
        match self {
            Change::CreateStore { name, options } => change.create_store(
                name,
                StoreParams {
                    key_path: options.key_path.clone(),
                    auto_increment: options.auto_increment,
                },
            ),
            Change::DeleteStore { name } => change.delete_store(name),
            Change::CreateIndex {
                store,
                name,
                key_path,
                options,
            } => change.create_index(
                store,
                name,
                IndexParams {
                    key_path: key_path.clone(),
                    unique: options.unique,
                    multi_entry: options.multi_entry,
                },
            ),
            Change::DeleteIndex { store, name } => change.delete_index(store, name),
        }
    }
}

/// Versioned store and index declarations.
///
/// Builder calls never fail; the first inconsistency is kept and reported
/// by [`Schema::validate`].
#[derive(Debug, Clone, Default)]
pub struct Schema {
    versions: Vec<(u32, Vec<Change>)>,
    stores: BTreeMap<String, StoreMeta>,
    current: Option<String>,
    error: Option<String>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn step(mut self, f: impl FnOnce(&mut Self) -> Result<(), String>) -> Self {
        if self.error.is_none() {
            if let Err(message) = f(&mut self) {
                self.error = Some(message);
            }
        }
        self
    }

    fn record(&mut self, change: Change) -> Result<(), String> {
        match self.versions.last_mut() {
            Some((_, changes)) => {
                changes.push(change);
                Ok(())
            }
            None => Err("declare a version before changing stores".to_string()),
        }
    }

    fn current_store(&mut self) -> Result<&mut StoreMeta, String> {
        let name = self
            .current
            .clone()
            .ok_or_else(|| "no store selected".to_string())?;
        self.stores
            .get_mut(&name)
            .ok_or_else(|| format!("store '{name}' was deleted"))
    }

    /// Starts the declarations of version `number`.
    ///
    /// Versions must be declared in increasing order, starting at 1.
    #[must_use]
    pub fn version(self, number: u32) -> Self {
        self.step(|schema| {
            let last = schema.latest_version();
            if number <= last {
                return Err(format!("version {number} must be greater than {last}"));
            }
            schema.versions.push((number, Vec::new()));
            schema.current = None;
            Ok(())
        })
    }

    /// Declares a store and selects it for [`Schema::add_index`].
    #[must_use]
    pub fn add_store(self, name: impl Into<String>, options: StoreOptions) -> Self {
        let name = name.into();
        self.step(|schema| {
            if schema.stores.contains_key(&name) {
                return Err(format!("store '{name}' is already declared"));
            }
            if options.key_path.as_deref() == Some("") {
                return Err(format!("store '{name}' has an empty key path"));
            }
            schema.record(Change::CreateStore {
                name: name.clone(),
                options: options.clone(),
            })?;
            schema.stores.insert(
                name.clone(),
                StoreMeta {
                    name: name.clone(),
                    options,
                    indexes: BTreeMap::new(),
                },
            );
            schema.current = Some(name);
            Ok(())
        })
    }

    /// Selects an already declared store.
    #[must_use]
    pub fn get_store(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.step(|schema| {
            if !schema.stores.contains_key(&name) {
                return Err(format!("store '{name}' is not declared"));
            }
            schema.current = Some(name);
            Ok(())
        })
    }

    /// Deletes a declared store with its indexes.
    #[must_use]
    pub fn del_store(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.step(|schema| {
            if !schema.stores.contains_key(&name) {
                return Err(format!("store '{name}' is not declared"));
            }
            schema.record(Change::DeleteStore { name: name.clone() })?;
            schema.stores.remove(&name);
            if schema.current.as_deref() == Some(name.as_str()) {
                schema.current = None;
            }
            Ok(())
        })
    }

    /// Declares an index on the selected store.
    #[must_use]
    pub fn add_index(
        self,
        name: impl Into<String>,
        key_path: impl Into<String>,
        options: IndexOptions,
    ) -> Self {
        let name = name.into();
        let key_path = key_path.into();
        self.step(|schema| {
            if key_path.is_empty() {
                return Err(format!("index '{name}' has an empty key path"));
            }
            let store = schema.current_store()?;
            if store.indexes.contains_key(&name) {
                return Err(format!(
                    "index '{name}' is already declared on '{}'",
                    store.name
                ));
            }
            let meta = Arc::new(IndexMeta {
                name: name.clone(),
                key_path: key_path.clone(),
                options,
            });
            store.indexes.insert(name.clone(), meta);
            let store = store.name.clone();
            schema.record(Change::CreateIndex {
                store,
                name,
                key_path,
                options,
            })
        })
    }

    /// Deletes an index of the selected store.
    #[must_use]
    pub fn del_index(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.step(|schema| {
            let store = schema.current_store()?;
            if store.indexes.remove(&name).is_none() {
                return Err(format!("index '{name}' is not declared on '{}'", store.name));
            }
            let store = store.name.clone();
            schema.record(Change::DeleteIndex { store, name })
        })
    }

    /// The latest declared version, or 0 when none was declared.
    pub fn latest_version(&self) -> u32 {
        self.versions.last().map_or(0, |(number, _)| *number)
    }

    /// Metadata of the stores as of the latest version.
    pub fn stores(&self) -> impl Iterator<Item = &StoreMeta> {
        self.stores.values()
    }

    /// Metadata of store `name` as of the latest version.
    pub fn store(&self, name: &str) -> Option<&StoreMeta> {
        self.stores.get(name)
    }

    /// Checks that the declarations are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] with the first inconsistency, or if no
    /// version was declared.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(message) = &self.error {
            return Err(CoreError::schema(message.clone()));
        }
        if self.versions.is_empty() {
            return Err(CoreError::schema("no version declared"));
        }
        Ok(())
    }

    /// Builds the engine upgrade hook: every change declared for a version
    /// newer than the stored one is applied in declaration order.
    pub fn upgrade_hook(&self) -> UpgradeHook {
        let versions = self.versions.clone();
        Box::new(move |change: &mut dyn VersionChange, old_version: u32| {
            for (number, changes) in versions.iter().filter(|(number, _)| *number > old_version) {
                trace!(version = number, changes = changes.len(), "applying schema version");
                for step in changes {
                    step.apply(change)?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_engine::{Engine, EngineHandle, MemoryEngine};
    use std::sync::Mutex;

    fn library() -> Schema {
        Schema::new()
            .version(1)
            .add_store("books", StoreOptions::new().key_path("isbn"))
            .add_index("byTitle", "title", IndexOptions::new().unique(true))
            .add_index("byAuthor", "author", IndexOptions::new())
            .add_store("storage", StoreOptions::new())
            .version(2)
            .get_store("books")
            .add_index("byYear", "year", IndexOptions::new())
    }

    fn open(engine: &MemoryEngine, schema: &Schema) -> Arc<dyn EngineHandle> {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        engine.open(
            "library",
            schema.latest_version(),
            schema.upgrade_hook(),
            Box::new(move |result| *sink.lock().unwrap() = Some(result)),
        );
        engine.run_pending();
        let result = slot.lock().unwrap().take().unwrap();
        result.unwrap()
    }

    #[test]
    fn metadata_reflects_latest_version() {
        let schema = library();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.latest_version(), 2);

        let books = schema.store("books").unwrap();
        assert_eq!(books.key_path(), Some("isbn"));
        assert!(!books.auto_increment());
        assert_eq!(books.index_names(), vec!["byAuthor", "byTitle", "byYear"]);
        assert!(books.index("byTitle").unwrap().unique());
        assert_eq!(books.index("byYear").unwrap().key_path(), "year");

        let names: Vec<&str> = schema.stores().map(StoreMeta::name).collect();
        assert_eq!(names, vec!["books", "storage"]);
    }

    #[test]
    fn deletions_update_metadata() {
        let schema = library()
            .version(3)
            .del_store("storage")
            .get_store("books")
            .del_index("byAuthor");
        assert!(schema.validate().is_ok());
        assert!(schema.store("storage").is_none());
        assert_eq!(
            schema.store("books").unwrap().index_names(),
            vec!["byTitle", "byYear"]
        );
    }

    #[test]
    fn first_error_is_kept() {
        let schema = Schema::new()
            .version(1)
            .add_store("books", StoreOptions::new())
            .add_store("books", StoreOptions::new())
            .get_store("missing");
        let err = schema.validate().unwrap_err();
        assert_eq!(
            err,
            CoreError::schema("store 'books' is already declared")
        );
    }

    #[test]
    fn invalid_declarations_are_rejected() {
        assert!(Schema::new().validate().is_err());
        assert!(Schema::new()
            .add_store("books", StoreOptions::new())
            .validate()
            .is_err());
        assert!(Schema::new().version(2).version(1).validate().is_err());
        assert!(Schema::new()
            .version(1)
            .add_index("byTitle", "title", IndexOptions::new())
            .validate()
            .is_err());
        assert!(Schema::new()
            .version(1)
            .add_store("books", StoreOptions::new().key_path(""))
            .validate()
            .is_err());
    }

    #[test]
    fn upgrade_replays_only_newer_versions() {
        let engine = MemoryEngine::new();
        let v1 = Schema::new()
            .version(1)
            .add_store("books", StoreOptions::new().key_path("isbn"));
        open(&engine, &v1).close();

        let v2 = v1
            .clone()
            .version(2)
            .add_store("magazines", StoreOptions::new().auto_increment(true));
        let handle = open(&engine, &v2);
        assert_eq!(handle.version(), 2);
        assert_eq!(handle.store_names(), vec!["books", "magazines"]);
        assert_eq!(engine.stats().upgrades, 2);
    }
}
