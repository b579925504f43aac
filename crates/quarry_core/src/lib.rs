//! # Quarry Core
//!
//! Transactions, stores and indexes over an event-driven object-store
//! engine.
//!
//! Engines such as [`quarry_engine::MemoryEngine`] commit a transaction by
//! themselves as soon as it has no pending request. This crate turns that
//! callback model into futures while keeping multi-request work inside
//! one transaction:
//! - a [`Database`] opens its engine handle once and shares it,
//! - a [`Transaction`] acquires at most one engine transaction and settles
//!   exactly once, observed by any number of awaiting callers,
//! - a [`Store`] runs single operations, ordered multi-key reads and
//!   deletes, atomic [`Batch`]es and cursors, issuing each dependent
//!   request from the completion of the previous one.
//!
//! ## Example
//!
//! ```rust
//! use quarry_codec::Value;
//! use quarry_core::{open, Batch, IndexOptions, Mode, Schema, StoreOptions};
//! use quarry_engine::MemoryEngine;
//!
//! let schema = Schema::new()
//!     .version(1)
//!     .add_store("books", StoreOptions::new().key_path("isbn"))
//!     .add_index("byTitle", "title", IndexOptions::new().unique(true));
//! let engine = MemoryEngine::new();
//! let db = open("library", schema, engine.clone()).unwrap();
//!
//! let title = engine
//!     .run_until(async move {
//!         let books = db.store("books")?;
//!         books
//!             .batch(
//!                 Batch::new()
//!                     .put(1, Value::object([("title", Value::from("Quarry Memories"))]))
//!                     .put(2, Value::object([("title", Value::from("Bedrock Nights"))])),
//!             )
//!             .await?;
//!
//!         let txn = db.transaction(["books"], Mode::ReadOnly);
//!         let found = txn.store("books")?.index("byTitle")?.get("Bedrock Nights").await?;
//!         txn.await?;
//!         Ok::<_, quarry_core::CoreError>(found)
//!     })
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(title.unwrap().get("isbn"), Some(&Value::from(2)));
//! ```
//!
//! ## Request chaining
//!
//! With the default [`RequestStrategy::Chained`], every multi-request unit
//! issues its next request from inside the previous request's completion.
//! Application code that awaits one result before issuing the next request
//! in the same [`Transaction`] may find it already committed, depending on
//! the engine's commit timing; prefer [`Store::batch`], [`Store::get_many`]
//! and [`Store::del_many`] for dependent work.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod cursor;
mod database;
mod error;
mod index;
mod mode;
mod schema;
mod sequencer;
mod store;
mod transaction;

pub use batch::{Batch, BatchOp};
pub use config::{Config, RequestStrategy};
pub use cursor::{Cursor, CursorOptions};
pub use database::{Database, DatabaseStatus};
pub use error::{CoreError, CoreResult};
pub use index::Index;
pub use mode::Mode;
pub use schema::{IndexMeta, IndexOptions, Schema, StoreMeta, StoreOptions};
pub use store::Store;
pub use transaction::{Event, ListenerId, Transaction, TransactionStatus};

// Re-export the engine types that appear in this crate's API.
pub use quarry_engine::{Direction, KeyRange};

/// Creates a [`Database`] named `name` on `engine` with the default
/// configuration.
///
/// # Errors
///
/// Returns [`CoreError::Schema`] if the schema is inconsistent.
pub fn open(
    name: impl Into<String>,
    schema: Schema,
    engine: impl quarry_engine::Engine + 'static,
) -> CoreResult<Database> {
    Database::new(name, schema, engine)
}
