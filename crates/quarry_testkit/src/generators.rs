//! Property-based test generators using proptest.
//!
//! Provides strategies for keys and records that are always valid for the
//! library stores, so properties exercise ordering and atomicity rather
//! than input validation.

use quarry_codec::Value;
use proptest::prelude::*;

/// Strategy for generating valid keys: integers and short text.
pub fn key_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-1000i64..1000).prop_map(Value::from),
        prop::string::string_regex("[a-z]{1,8}")
            .expect("Invalid regex")
            .prop_map(Value::from),
    ]
}

/// Strategy for generating flat records with a `title` text field and up
/// to four extra integer fields.
pub fn record_strategy() -> impl Strategy<Value = Value> {
    (
        prop::string::string_regex("[A-Z][a-z]{0,15}").expect("Invalid regex"),
        prop::collection::btree_map(
            prop::string::string_regex("[a-z]{1,6}").expect("Invalid regex"),
            any::<i32>(),
            0..4,
        ),
    )
        .prop_map(|(title, extra)| {
            let mut record = Value::object([("title", Value::from(title))]);
            for (field, value) in extra {
                if field != "title" {
                    record.insert(field, Value::from(value));
                }
            }
            record
        })
}

/// Strategy for generating a list of keys, possibly with repeats.
pub fn keys_strategy(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(key_strategy(), 0..max)
}

/// Strategy for generating key/record pairs for a store without key path.
/// `None` records stand for deletes.
pub fn batch_strategy(max: usize) -> impl Strategy<Value = Vec<(Value, Option<Value>)>> {
    prop::collection::vec(
        (key_strategy(), prop::option::weighted(0.8, record_strategy())),
        1..max,
    )
}

/// Strategy for generating `count` distinct book titles.
pub fn titles_strategy(count: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(
        prop::string::string_regex("[A-Z][a-z]{2,12}").expect("Invalid regex"),
        count,
    )
    .prop_map(|titles| titles.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_codec::is_valid_key;

    proptest! {
        #[test]
        fn test_keys_are_valid(key in key_strategy()) {
            prop_assert!(is_valid_key(&key));
        }

        #[test]
        fn test_records_have_a_title(record in record_strategy()) {
            prop_assert!(record.get("title").and_then(Value::as_text).is_some());
        }

        #[test]
        fn test_titles_are_distinct(titles in titles_strategy(5)) {
            let mut sorted = titles.clone();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), 5);
        }
    }
}
