//! # Quarry Engine
//!
//! The object-store engine contract used by `quarry_core`, and an
//! in-memory engine implementing it.
//!
//! An engine is event driven: every request is issued with a completion
//! callback, and a transaction commits automatically once it has no
//! pending request. The access layer in `quarry_core` is written against
//! the traits in this crate and never against a concrete engine.
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - in-process, single-threaded event loop; used for
//!   tests and ephemeral databases
//!
//! ## Example
//!
//! ```rust
//! use quarry_engine::{Engine, MemoryEngine, StoreParams, TransactionMode, VersionChange};
//! use quarry_codec::Value;
//! use futures_channel::oneshot;
//!
//! let engine = MemoryEngine::new();
//! let (tx, rx) = oneshot::channel();
//! engine.open(
//!     "scratch",
//!     1,
//!     Box::new(|change: &mut dyn VersionChange, _old: u32| {
//!         change.create_store("notes", StoreParams::default())
//!     }),
//!     Box::new(move |handle| { let _ = tx.send(handle); }),
//! );
//! let handle = engine.run_until(rx).unwrap().unwrap().unwrap();
//!
//! let txn = handle.transaction(&["notes".to_string()], TransactionMode::ReadWrite).unwrap();
//! let (tx, rx) = oneshot::channel();
//! txn.object_store("notes")
//!     .unwrap()
//!     .put(
//!         Some(Value::from(1)),
//!         Value::from("hello"),
//!         Box::new(move |key| {
//!             let _ = tx.send(key);
//!         }),
//!     )
//!     .unwrap();
//! assert_eq!(engine.run_until(rx).unwrap().unwrap(), Ok(Value::from(1)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod range;
mod traits;
mod types;

pub use error::{EngineError, EngineResult};
pub use memory::{CommitPolicy, EngineStats, MemoryConfig, MemoryEngine, StatsSnapshot};
pub use range::{Direction, KeyRange};
pub use traits::{
    Callback, CursorStep, Engine, EngineCursor, EngineHandle, EngineIndex, EngineStore,
    EngineTransaction, ErrorListener, Listener, UpgradeHook, VersionChange,
};
pub use types::{IndexParams, StoreParams, TransactionMode};
