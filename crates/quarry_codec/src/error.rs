//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding, decoding or reshaping values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Float values are not representable in records.
    #[error("float values are not supported")]
    FloatForbidden,

    /// Map keys inside records must be text.
    #[error("map keys must be text, found {found}")]
    NonTextMapKey {
        /// Kind of the offending key.
        found: String,
    },

    /// A key path could not be read or written on a value.
    #[error("invalid key path '{path}': {message}")]
    InvalidKeyPath {
        /// The key path that failed.
        path: String,
        /// Why it failed.
        message: String,
    },
}

impl CodecError {
    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key path error.
    pub fn invalid_key_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKeyPath {
            path: path.into(),
            message: message.into(),
        }
    }
}
