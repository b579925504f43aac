//! # Quarry Codec
//!
//! Record values for Quarry object stores.
//!
//! This crate provides:
//! - [`Value`], the dynamic record type stored in object stores
//! - key validation and the total key order used by stores and indexes
//! - CBOR encoding of records, used by engines to store deep copies
//!
//! ## Usage
//!
//! ```
//! use quarry_codec::{from_cbor, to_cbor, Value};
//!
//! let book = Value::object([("isbn", Value::from(1)), ("title", Value::from("Bedrock Nights"))]);
//! let bytes = to_cbor(&book).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), book);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod key;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use key::{cmp_keys, is_valid_key, Key};
pub use value::Value;
