//! # Quarry Testkit
//!
//! Test utilities for Quarry.
//!
//! This crate provides:
//! - The library fixture: a versioned schema with `books`, `magazines` and
//!   `storage` stores, sample records and a [`TestLibrary`] harness
//! - JSON-to-record conversion for readable test data
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use quarry_testkit::prelude::*;
//!
//! let library = TestLibrary::new();
//! let count = library.run(|db| async move {
//!     seed_books(&db).await?;
//!     db.store("books")?.count(None).await
//! });
//! assert_eq!(count.unwrap(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod json;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::json::*;
}

pub use fixtures::*;
pub use generators::*;
pub use json::*;
