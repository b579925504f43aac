//! Transaction modes.

use crate::error::CoreError;
use quarry_engine::TransactionMode;
use std::fmt;
use std::str::FromStr;

/// Access mode of a [`Transaction`](crate::Transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Reads only.
    #[default]
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl Mode {
    /// Whether writes are allowed.
    pub fn is_writable(self) -> bool {
        self == Mode::ReadWrite
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::ReadOnly => "readonly",
            Mode::ReadWrite => "readwrite",
        })
    }
}

/// Accepts `readonly`/`read` and `readwrite`/`write`.
impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readonly" | "read" => Ok(Mode::ReadOnly),
            "readwrite" | "write" => Ok(Mode::ReadWrite),
            other => Err(CoreError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

impl From<Mode> for TransactionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::ReadOnly => TransactionMode::ReadOnly,
            Mode::ReadWrite => TransactionMode::ReadWrite,
        }
    }
}
