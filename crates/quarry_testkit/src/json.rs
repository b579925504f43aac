//! JSON test records.
//!
//! `serde_json::json!` reads better than nested `Value::object` calls, so
//! fixtures and tests write their records as JSON and convert them here.

use quarry_codec::Value;

/// Converts a JSON document into a record.
///
/// # Panics
///
/// Panics if the document holds a float or an integer outside the `i64`
/// range. Use [`try_record`] to observe the error instead.
pub fn record(json: serde_json::Value) -> Value {
    try_record(json).expect("JSON document is not a valid record")
}

/// Converts a JSON document into a record.
///
/// # Errors
///
/// Fails if the document holds a float or an out-of-range integer.
pub fn try_record(json: serde_json::Value) -> Result<Value, serde_json::Error> {
    serde_json::from_value(json)
}

/// Converts a list of JSON documents into records.
pub fn records(docs: impl IntoIterator<Item = serde_json::Value>) -> Vec<Value> {
    docs.into_iter().map(record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_document() {
        let value = record(json!({
            "isbn": 1,
            "title": "Quarry Memories",
            "tags": ["stone", "age"],
            "meta": { "draft": false, "sequel": null }
        }));
        assert_eq!(value.get("isbn"), Some(&Value::from(1)));
        assert_eq!(value.get_path("meta.draft"), Some(&Value::Bool(false)));
        assert_eq!(value.get_path("meta.sequel"), Some(&Value::Null));
        assert_eq!(
            value.get("tags"),
            Some(&Value::Array(vec![Value::from("stone"), Value::from("age")]))
        );
    }

    #[test]
    fn test_field_order_is_irrelevant() {
        assert_eq!(
            record(json!({ "a": 1, "b": 2 })),
            record(json!({ "b": 2, "a": 1 }))
        );
    }

    #[test]
    fn test_floats_are_rejected() {
        assert!(try_record(json!({ "price": 9.5 })).is_err());
    }
}
