//! CBOR encoding of record values.
//!
//! Records cross the engine boundary as CBOR produced by `ciborium`. The
//! engine stores the bytes, so every read decodes a fresh copy and callers
//! never share mutable state with the store.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Encode a value to CBOR bytes.
///
/// Map fields are emitted in sorted order, so equal values always encode
/// to identical bytes.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|err| CodecError::encoding_failed(format!("{err:?}")))?;
    Ok(buffer)
}

/// Decode a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not well-formed CBOR, contain floats,
/// or contain maps with non-text keys.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    ciborium::de::from_reader(bytes).map_err(|err| match err {
        ciborium::de::Error::Semantic(_, message) if message == FLOAT_MESSAGE => {
            CodecError::FloatForbidden
        }
        other => CodecError::decoding_failed(format!("{other:?}")),
    })
}

const FLOAT_MESSAGE: &str = "float values are not supported";

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a record value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        i64::try_from(v)
            .map(Value::Integer)
            .map_err(|_| E::custom(format!("integer {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<Value, E> {
        Err(E::custom(FLOAT_MESSAGE))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((name, value)) = map.next_entry::<Value, Value>()? {
            match name {
                Value::Text(name) => fields.push((name, value)),
                other => {
                    return Err(de::Error::custom(CodecError::NonTextMapKey {
                        found: other.kind().to_string(),
                    }))
                }
            }
        }
        Ok(Value::object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Value {
        Value::object([
            ("isbn", Value::from(1)),
            ("title", Value::from("Quarry Memories")),
            ("author", Value::from("Fred")),
            (
                "tags",
                Value::Array(vec![Value::from("stone"), Value::from("age")]),
            ),
            ("cover", Value::Bytes(vec![0xde, 0xad])),
            ("draft", Value::Bool(false)),
            ("sequel", Value::Null),
        ])
    }

    #[test]
    fn nested_record_survives_encoding() {
        let value = book();
        let bytes = to_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = Value::object([("b", Value::from(2)), ("a", Value::from(1))]);
        let b = Value::object([("a", Value::from(1)), ("b", Value::from(2))]);
        assert_eq!(to_cbor(&a).unwrap(), to_cbor(&b).unwrap());
    }

    #[test]
    fn large_negative_integers_are_kept() {
        let value = Value::Integer(i64::MIN);
        assert_eq!(from_cbor(&to_cbor(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn floats_are_rejected() {
        // 0xf9 3c00 is the half-precision float 1.0
        let result = from_cbor(&[0xf9, 0x3c, 0x00]);
        assert_eq!(result, Err(CodecError::FloatForbidden));
    }

    #[test]
    fn integer_map_keys_are_rejected() {
        // {1: 2}
        let result = from_cbor(&[0xa1, 0x01, 0x02]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = to_cbor(&book()).unwrap();
        assert!(from_cbor(&bytes[..bytes.len() - 3]).is_err());
    }
}
