//! Ordered batches of writes.

use quarry_codec::Value;

/// One operation of a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Create or replace a record. `key` is `None` when the store reads
    /// keys from its key path or generates them.
    Put {
        /// Explicit key.
        key: Option<Value>,
        /// The record.
        value: Value,
    },
    /// Delete the record at `key`, if any.
    Delete {
        /// Key of the record.
        key: Value,
    },
}

/// Puts and deletes applied in order inside one transaction.
///
/// Either every operation lands or none does.
///
/// ```rust
/// use quarry_codec::Value;
/// use quarry_core::Batch;
///
/// let batch = Batch::new()
///     .put(1, "one")
///     .put(2, "two")
///     .del(3);
/// assert_eq!(batch.len(), 3);
///
/// // the same batch as key/value pairs, where `None` deletes
/// let pairs = Batch::from(vec![
///     (1, Some(Value::from("one"))),
///     (2, Some(Value::from("two"))),
///     (3, None),
/// ]);
/// assert_eq!(batch, pairs);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put at `key`. For stores with a key path, the key is
    /// written into the record if the record lacks it.
    #[must_use]
    pub fn put(mut self, key: impl Into<Value>, value: impl Into<Value>) -> Self {
        self.ops.push(BatchOp::Put {
            key: Some(key.into()),
            value: value.into(),
        });
        self
    }

    /// Appends a put whose key comes from the record or the key generator.
    #[must_use]
    pub fn put_value(mut self, value: impl Into<Value>) -> Self {
        self.ops.push(BatchOp::Put {
            key: None,
            value: value.into(),
        });
        self
    }

    /// Appends a delete of `key`.
    #[must_use]
    pub fn del(mut self, key: impl Into<Value>) -> Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    /// The operations, in application order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no operation.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

impl<K: Into<Value>> From<Vec<(K, Option<Value>)>> for Batch {
    fn from(pairs: Vec<(K, Option<Value>)>) -> Self {
        pairs
            .into_iter()
            .fold(Batch::new(), |batch, (key, value)| match value {
                Some(value) => batch.put(key, value),
                None => batch.del(key),
            })
    }
}

impl FromIterator<BatchOp> for Batch {
    fn from_iter<I: IntoIterator<Item = BatchOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}
