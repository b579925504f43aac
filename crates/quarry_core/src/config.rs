//! Database configuration.

use crate::mode::Mode;

/// How the requests of a multi-operation unit are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStrategy {
    /// Each request is issued from the completion callback of the previous
    /// one. Required by engines that commit a transaction as soon as it has
    /// no pending request.
    #[default]
    Chained,
    /// Every request is issued up front. Only safe with engines that keep a
    /// transaction open until it is explicitly finished or has queued work.
    Pipelined,
}

/// Configuration passed when constructing a [`Database`](crate::Database).
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Mode of transactions created without an explicit mode.
    pub default_mode: Mode,

    /// Issuance strategy for multi-key reads, deletes and batches.
    pub request_strategy: RequestStrategy,
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mode used when a transaction is created without one.
    #[must_use]
    pub const fn default_mode(mut self, mode: Mode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Sets the request issuance strategy.
    #[must_use]
    pub const fn request_strategy(mut self, strategy: RequestStrategy) -> Self {
        self.request_strategy = strategy;
        self
    }
}
