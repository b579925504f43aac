//! Test fixtures and database helpers.
//!
//! The library fixture declares three schema versions:
//! - v1 creates `books` (key path `isbn`) with the unique `byTitle` and the
//!   non-unique `byAuthor` indexes, and `storage` without a key path,
//! - v2 adds `byYear` to `books`,
//! - v3 creates `magazines` (key path `id`, auto-increment) with
//!   `byPublisher`, `byFrequency` and the multi-entry `byWords`.

use crate::json::{record, records};
use quarry_codec::Value;
use quarry_core::{
    Batch, Config, CoreResult, Database, IndexOptions, Schema, StoreOptions,
};
use quarry_engine::{EngineResult, MemoryConfig, MemoryEngine, StatsSnapshot};
use serde_json::json;
use std::future::Future;
use tracing_subscriber::EnvFilter;

/// Name of the fixture database.
pub const LIBRARY: &str = "quarry.library";

/// The library schema, at version 3.
pub fn library_schema() -> Schema {
    Schema::new()
        .version(1)
        .add_store("books", StoreOptions::new().key_path("isbn"))
        .add_index("byTitle", "title", IndexOptions::new().unique(true))
        .add_index("byAuthor", "author", IndexOptions::new())
        .add_store("storage", StoreOptions::new())
        .version(2)
        .get_store("books")
        .add_index("byYear", "year", IndexOptions::new())
        .version(3)
        .add_store(
            "magazines",
            StoreOptions::new().key_path("id").auto_increment(true),
        )
        .add_index("byPublisher", "publisher", IndexOptions::new())
        .add_index("byFrequency", "frequency", IndexOptions::new())
        .add_index("byWords", "words", IndexOptions::new().multi_entry(true))
}

/// Three books: two by Fred, two from 2012.
pub fn sample_books() -> Vec<Value> {
    records([
        json!({ "isbn": 1, "title": "Quarry Memories", "author": "Fred", "year": 2012 }),
        json!({ "isbn": 2, "title": "Water Buffaloes", "author": "Fred", "year": 2013 }),
        json!({ "isbn": 3, "title": "Bedrock Nights", "author": "Barney", "year": 2012 }),
    ])
}

/// Four magazines without ids, so the key generator assigns 1 to 4.
pub fn sample_magazines() -> Vec<Value> {
    records([
        json!({
            "title": "Quarry Weekly",
            "publisher": "Leanpub",
            "frequency": 52,
            "words": ["quarry", "stone"]
        }),
        json!({
            "title": "Bedrock Monthly",
            "publisher": "Bob",
            "frequency": 12,
            "words": ["bedrock", "stone"]
        }),
        json!({
            "title": "Gravel Digest",
            "publisher": "Leanpub",
            "frequency": 12,
            "words": ["gravel"]
        }),
        json!({
            "title": "Slate Quarterly",
            "publisher": "Bob",
            "frequency": 4,
            "words": []
        }),
    ])
}

/// A book that is not part of [`sample_books`].
pub fn extra_book() -> Value {
    record(json!({ "isbn": 4, "title": "Flintstone Tales", "author": "Wilma", "year": 2014 }))
}

/// Writes [`sample_books`] in one batch.
///
/// # Errors
///
/// Fails if the batch fails.
pub async fn seed_books(db: &Database) -> CoreResult<()> {
    let batch = sample_books().into_iter().fold(Batch::new(), Batch::put_value);
    db.store("books")?.batch(batch).await
}

/// Writes [`sample_magazines`] in one batch.
///
/// # Errors
///
/// Fails if the batch fails.
pub async fn seed_magazines(db: &Database) -> CoreResult<()> {
    let batch = sample_magazines()
        .into_iter()
        .fold(Batch::new(), Batch::put_value);
    db.store("magazines")?.batch(batch).await
}

/// A library database on its own [`MemoryEngine`].
pub struct TestLibrary {
    /// The engine, for driving futures and reading counters.
    pub engine: MemoryEngine,
    /// The database instance.
    pub db: Database,
}

impl Default for TestLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLibrary {
    /// Creates a library on a default engine with the default
    /// configuration.
    pub fn new() -> Self {
        Self::with(MemoryConfig::default(), Config::default())
    }

    /// Creates a library with explicit engine and database configuration.
    pub fn with(engine: MemoryConfig, config: Config) -> Self {
        let engine = MemoryEngine::with_config(engine);
        let db = Database::with_config(LIBRARY, library_schema(), engine.clone(), config)
            .expect("library schema is valid");
        Self { engine, db }
    }

    /// Opens another database over the same engine, as a second
    /// connection would.
    pub fn connect(&self, schema: Schema) -> CoreResult<Database> {
        Database::new(LIBRARY, schema, self.engine.clone())
    }

    /// Drives `test` to completion on the engine's event loop.
    ///
    /// # Panics
    ///
    /// Panics if the event loop stalls.
    pub fn run<F, Fut, T>(&self, test: F) -> T
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = T> + 'static,
        T: 'static,
    {
        self.try_run(test).expect("event loop stalled")
    }

    /// Drives `test` to completion, reporting a stalled event loop.
    ///
    /// # Errors
    ///
    /// Returns the engine's `Stalled` error.
    pub fn try_run<F, Fut, T>(&self, test: F) -> EngineResult<T>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = T> + 'static,
        T: 'static,
    {
        self.engine.run_until(test(self.db.clone()))
    }

    /// Current engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats()
    }
}

impl std::ops::Deref for TestLibrary {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Installs a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_valid() {
        let schema = library_schema();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.latest_version(), 3);
        let books = schema.store("books").unwrap();
        assert_eq!(books.key_path(), Some("isbn"));
        assert_eq!(books.index_names(), vec!["byAuthor", "byTitle", "byYear"]);
    }

    #[test]
    fn test_seeded_library() {
        init_tracing();
        let library = TestLibrary::new();
        let (books, magazines) = library.run(|db| async move {
            seed_books(&db).await?;
            seed_magazines(&db).await?;
            let books = db.store("books")?.count(None).await?;
            let magazines = db.store("magazines")?.get_all(None).await?;
            Ok::<_, quarry_core::CoreError>((books, magazines))
        })
        .unwrap();
        assert_eq!(books, 3);
        let ids: Vec<_> = magazines.iter().map(|m| m.get("id").cloned()).collect();
        assert_eq!(
            ids,
            vec![
                Some(Value::from(1)),
                Some(Value::from(2)),
                Some(Value::from(3)),
                Some(Value::from(4)),
            ]
        );
        assert_eq!(library.stats().upgrades, 1);
    }
}
