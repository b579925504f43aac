//! Dynamic record value type.

use crate::error::{CodecError, CodecResult};

/// A dynamic record value.
///
/// Records stored in an object store are trees of `Value`. Maps built
/// through [`Value::object`] or [`Value::insert`] keep their fields sorted
/// by name. A `Value::Map` built directly may be in any order; lookups
/// still find its fields, equality ignores field order, and
/// [`Value::normalize`] restores the sorted form. Floats are not
/// representable.
#[derive(Debug, Clone, Eq, Default)]
pub enum Value {
    /// Null value. Also used as the "not found" placeholder in multi-key reads.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of named fields, normally sorted by field name.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Creates a map value from `(field, value)` pairs.
    ///
    /// Later duplicates of a field replace earlier ones.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut map = Value::Map(Vec::new());
        for (name, value) in fields {
            map.insert(name, value);
        }
        map
    }

    /// Returns a short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a field in this map value.
    ///
    /// When a field occurs more than once in an unsorted map, the last
    /// occurrence is returned.
    pub fn get(&self, field: &str) -> Option<&Value> {
        let Value::Map(fields) = self else {
            return None;
        };
        let idx = if is_sorted(fields) {
            fields
                .binary_search_by(|(name, _)| name.as_str().cmp(field))
                .ok()
        } else {
            fields.iter().rposition(|(name, _)| name == field)
        };
        idx.map(|idx| &fields[idx].1)
    }

    /// Inserts or replaces a field. Returns the previous value of the field.
    ///
    /// An unsorted map is normalized first. Does nothing and returns `None`
    /// when `self` is not a map.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        let Value::Map(fields) = self else {
            return None;
        };
        sort_fields(fields);
        let field = field.into();
        match fields.binary_search_by(|(name, _)| name.as_str().cmp(field.as_str())) {
            Ok(idx) => Some(std::mem::replace(&mut fields[idx].1, value)),
            Err(idx) => {
                fields.insert(idx, (field, value));
                None
            }
        }
    }

    /// Sorts the fields of every map in this value by name, keeping the last
    /// occurrence of a repeated field.
    pub fn normalize(&mut self) {
        match self {
            Value::Array(items) => items.iter_mut().for_each(Value::normalize),
            Value::Map(fields) => {
                for (_, value) in fields.iter_mut() {
                    value.normalize();
                }
                sort_fields(fields);
            }
            _ => {}
        }
    }

    /// Resolves a dotted key path (`"a.b.c"`) against this value.
    ///
    /// Returns `None` if any segment is missing or a non-map value is
    /// traversed.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(self, |current, segment| current.get(segment))
    }

    /// Writes `value` at a dotted key path, creating intermediate maps.
    ///
    /// # Errors
    ///
    /// Fails if the path is empty or traverses a value that is not a map.
    pub fn set_path(&mut self, path: &str, value: Value) -> CodecResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(CodecError::invalid_key_path(path, "empty path"));
        };
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(CodecError::invalid_key_path(path, "empty segment"));
        }

        let mut current = self;
        for segment in parents {
            current = match current {
                Value::Map(fields) => {
                    sort_fields(fields);
                    let found = fields.binary_search_by(|(name, _)| name.as_str().cmp(segment));
                    let idx = match found {
                        Ok(idx) => idx,
                        Err(idx) => {
                            fields.insert(idx, ((*segment).to_string(), Value::Map(Vec::new())));
                            idx
                        }
                    };
                    &mut fields[idx].1
                }
                other => {
                    return Err(CodecError::invalid_key_path(
                        path,
                        format!("cannot assign into {}", other.kind()),
                    ))
                }
            };
        }

        if !matches!(current, Value::Map(_)) {
            return Err(CodecError::invalid_key_path(
                path,
                format!("cannot assign into {}", current.kind()),
            ));
        }
        current.insert(*last, value);
        Ok(())
    }
}

fn is_sorted(fields: &[(String, Value)]) -> bool {
    fields.windows(2).all(|pair| pair[0].0 < pair[1].0)
}

/// Sorts `fields` by name; the last of several equal names wins.
fn sort_fields(fields: &mut Vec<(String, Value)>) {
    if is_sorted(fields) {
        return;
    }
    // stable, so duplicates stay in insertion order
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    let mut deduped: Vec<(String, Value)> = Vec::with_capacity(fields.len());
    for (name, value) in fields.drain(..) {
        match deduped.last_mut() {
            Some(last) if last.0 == name => last.1 = value,
            _ => deduped.push((name, value)),
        }
    }
    *fields = deduped;
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) if is_sorted(a) && is_sorted(b) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                let (mut a, mut b) = (a.clone(), b.clone());
                sort_fields(&mut a);
                sort_fields(&mut b);
                a == b
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
