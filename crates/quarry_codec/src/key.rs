//! Record keys and their total order.
//!
//! Only a subset of values can act as keys: integers, text, byte strings,
//! and arrays whose elements are themselves valid keys. Keys are ordered
//! by type first (`integer < text < bytes < array`), then by content.
//! Arrays compare element by element, and a shorter array sorts first when
//! it is a prefix of a longer one.

use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// Checks whether `value` may be used as a record or index key.
pub fn is_valid_key(value: &Value) -> bool {
    match value {
        Value::Integer(_) | Value::Text(_) | Value::Bytes(_) => true,
        Value::Array(items) => items.iter().all(is_valid_key),
        Value::Null | Value::Bool(_) | Value::Map(_) => false,
    }
}

/// Compares two key values.
///
/// Values that are not valid keys sort after every valid key; callers are
/// expected to validate with [`is_valid_key`] before relying on the order.
pub fn cmp_keys(a: &Value, b: &Value) -> Ordering {
    let rank_a = type_rank(a);
    let rank_b = type_rank(b);
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = cmp_keys(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Integer(_) => 0,
        Value::Text(_) => 1,
        Value::Bytes(_) => 2,
        Value::Array(_) => 3,
        Value::Null | Value::Bool(_) | Value::Map(_) => u8::MAX,
    }
}

/// A validated key with a total order, suitable for ordered maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(Value);

impl Key {
    /// Wraps `value` if it is a valid key.
    pub fn new(value: Value) -> Option<Self> {
        is_valid_key(&value).then_some(Self(value))
    }

    /// Returns the underlying value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the key and returns the underlying value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_keys(&self.0, &other.0)
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", Key(item.clone()))?;
                }
                write!(f, "]")
            }
            other => write!(f, "<{}>", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn only_scalars_and_arrays_are_keys() {
        assert!(is_valid_key(&Value::from(1)));
        assert!(is_valid_key(&Value::from("id1")));
        assert!(is_valid_key(&Value::Bytes(vec![0])));
        assert!(is_valid_key(&Value::Array(vec![Value::from(1), Value::from("a")])));

        assert!(!is_valid_key(&Value::Null));
        assert!(!is_valid_key(&Value::Bool(true)));
        assert!(!is_valid_key(&Value::object([("a", Value::from(1))])));
        assert!(!is_valid_key(&Value::Array(vec![Value::Null])));
    }

    #[test]
    fn types_order_before_content() {
        let mut keys = vec![
            Key::new(Value::Array(vec![])).unwrap(),
            Key::new(Value::Bytes(vec![0])).unwrap(),
            Key::new(Value::from("a")).unwrap(),
            Key::new(Value::from(i64::MAX)).unwrap(),
        ];
        keys.sort();
        assert_eq!(keys[0].as_value(), &Value::Integer(i64::MAX));
        assert_eq!(keys[1].as_value(), &Value::from("a"));
        assert_eq!(keys[2].as_value(), &Value::Bytes(vec![0]));
        assert_eq!(keys[3].as_value(), &Value::Array(vec![]));
    }

    #[test]
    fn arrays_compare_elementwise_then_by_length() {
        let short = Value::Array(vec![Value::from(1)]);
        let long = Value::Array(vec![Value::from(1), Value::from(0)]);
        let bigger = Value::Array(vec![Value::from(2)]);
        assert_eq!(cmp_keys(&short, &long), Ordering::Less);
        assert_eq!(cmp_keys(&long, &bigger), Ordering::Less);
    }

    #[test]
    fn display_is_readable() {
        let key = Key::new(Value::Array(vec![Value::from(1), Value::from("x")])).unwrap();
        assert_eq!(key.to_string(), "[1, \"x\"]");
    }

    proptest! {
        #[test]
        fn integer_keys_follow_numeric_order(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(cmp_keys(&Value::from(a), &Value::from(b)), a.cmp(&b));
        }

        #[test]
        fn text_keys_follow_string_order(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            prop_assert_eq!(
                cmp_keys(&Value::from(a.as_str()), &Value::from(b.as_str())),
                a.cmp(&b)
            );
        }
    }
}
