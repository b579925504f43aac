//! Record storage of one object store.

use crate::error::{EngineError, EngineResult};
use crate::range::{to_key, Direction, KeyRange};
use crate::types::{IndexParams, StoreParams};
use quarry_codec::{from_cbor, to_cbor, Key, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{self, Excluded, Included, Unbounded};

/// A record found by a cursor.
#[derive(Debug, Clone)]
pub(crate) struct Hit {
    pub(crate) key: Key,
    pub(crate) primary_key: Key,
    pub(crate) value: Value,
}

#[derive(Debug, Clone)]
struct IndexData {
    params: IndexParams,
    /// index key -> primary keys
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

/// Records and indexes of one object store. Records are kept as CBOR so
/// every read hands out a fresh copy.
#[derive(Debug, Clone)]
pub(crate) struct StoreData {
    params: StoreParams,
    indexes: BTreeMap<String, IndexData>,
    records: BTreeMap<Key, Vec<u8>>,
    next_key: i64,
}

fn bounds(range: Option<&KeyRange>) -> (Bound<Key>, Bound<Key>) {
    let Some(range) = range else {
        return (Unbounded, Unbounded);
    };
    let lower = match range.lower() {
        Some(key) if range.lower_open() => Excluded(key.clone()),
        Some(key) => Included(key.clone()),
        None => Unbounded,
    };
    let upper = match range.upper() {
        Some(key) if range.upper_open() => Excluded(key.clone()),
        Some(key) => Included(key.clone()),
        None => Unbounded,
    };
    (lower, upper)
}

fn index_keys(params: &IndexParams, record: &Value) -> Vec<Key> {
    let Some(value) = record.get_path(&params.key_path) else {
        return Vec::new();
    };
    match value {
        Value::Array(items) if params.multi_entry => {
            let mut keys: Vec<Key> = items.iter().cloned().filter_map(Key::new).collect();
            keys.sort();
            keys.dedup();
            keys
        }
        other => Key::new(other.clone()).into_iter().collect(),
    }
}

impl StoreData {
    pub(crate) fn new(params: StoreParams) -> Self {
        Self {
            params,
            indexes: BTreeMap::new(),
            records: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub(crate) fn params(&self) -> &StoreParams {
        &self.params
    }

    pub(crate) fn index_params(&self) -> BTreeMap<String, IndexParams> {
        self.indexes
            .iter()
            .map(|(name, index)| (name.clone(), index.params.clone()))
            .collect()
    }

    fn index(&self, name: &str) -> EngineResult<&IndexData> {
        self.indexes
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("index '{name}'")))
    }

    fn decode(&self, primary_key: &Key) -> EngineResult<Option<Value>> {
        self.records
            .get(primary_key)
            .map(|bytes| from_cbor(bytes))
            .transpose()
            .map_err(EngineError::from)
    }

    pub(crate) fn get(&self, key: &Key) -> EngineResult<Option<Value>> {
        self.decode(key)
    }

    /// Writes a record and returns its key. `overwrite` distinguishes put
    /// from add.
    pub(crate) fn put(
        &mut self,
        key: Option<Value>,
        mut value: Value,
        overwrite: bool,
    ) -> EngineResult<Value> {
        value.normalize();
        let key = match (&self.params.key_path, key) {
            (Some(path), Some(_)) => {
                return Err(EngineError::data(format!(
                    "store keys are read from '{path}'; an explicit key is not allowed"
                )))
            }
            (Some(path), None) => match value.get_path(path) {
                Some(existing) => existing.clone(),
                None if self.params.auto_increment => {
                    let generated = Value::Integer(self.next_key);
                    value
                        .set_path(path, generated.clone())
                        .map_err(|err| EngineError::data(err.to_string()))?;
                    generated
                }
                None => return Err(EngineError::data(format!("record has no key at '{path}'"))),
            },
            (None, Some(key)) => key,
            (None, None) if self.params.auto_increment => Value::Integer(self.next_key),
            (None, None) => {
                return Err(EngineError::data(
                    "no key given and the store has no key generator",
                ))
            }
        };
        let key = to_key(key)?;

        if !overwrite && self.records.contains_key(&key) {
            return Err(EngineError::constraint(format!("key {key} already exists")));
        }
        for (name, index) in &self.indexes {
            if !index.params.unique {
                continue;
            }
            for index_key in index_keys(&index.params, &value) {
                let taken = index
                    .entries
                    .get(&index_key)
                    .is_some_and(|owners| owners.iter().any(|owner| owner != &key));
                if taken {
                    return Err(EngineError::constraint(format!(
                        "index '{name}' already holds {index_key}"
                    )));
                }
            }
        }

        let bytes = to_cbor(&value)?;
        if let Some(previous) = self.decode(&key)? {
            self.unindex(&key, &previous);
        }
        if let Value::Integer(n) = key.as_value() {
            if *n >= self.next_key {
                self.next_key = n.saturating_add(1);
            }
        }
        for index in self.indexes.values_mut() {
            for index_key in index_keys(&index.params, &value) {
                index.entries.entry(index_key).or_default().insert(key.clone());
            }
        }
        self.records.insert(key.clone(), bytes);
        Ok(key.into_value())
    }

    fn unindex(&mut self, key: &Key, record: &Value) {
        for index in self.indexes.values_mut() {
            for index_key in index_keys(&index.params, record) {
                if let Some(owners) = index.entries.get_mut(&index_key) {
                    owners.remove(key);
                    if owners.is_empty() {
                        index.entries.remove(&index_key);
                    }
                }
            }
        }
    }

    pub(crate) fn delete(&mut self, key: &Key) -> EngineResult<()> {
        if let Some(previous) = self.decode(key)? {
            self.unindex(key, &previous);
            self.records.remove(key);
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    pub(crate) fn count(&self, range: Option<&KeyRange>) -> u64 {
        self.records.range(bounds(range)).count() as u64
    }

    pub(crate) fn index_get(&self, index: &str, key: &Key) -> EngineResult<Option<Value>> {
        let first = self
            .index(index)?
            .entries
            .get(key)
            .and_then(|owners| owners.first());
        match first {
            Some(primary_key) => self.decode(primary_key),
            None => Ok(None),
        }
    }

    pub(crate) fn index_count(&self, index: &str, range: Option<&KeyRange>) -> EngineResult<u64> {
        Ok(self
            .index(index)?
            .entries
            .range(bounds(range))
            .map(|(_, owners)| owners.len() as u64)
            .sum())
    }

    pub(crate) fn create_index(&mut self, name: &str, params: IndexParams) -> EngineResult<()> {
        if self.indexes.contains_key(name) {
            return Err(EngineError::constraint(format!("index '{name}' already exists")));
        }
        let mut entries: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
        for (key, bytes) in &self.records {
            let record = from_cbor(bytes)?;
            for index_key in index_keys(&params, &record) {
                let owners = entries.entry(index_key).or_default();
                if params.unique && !owners.is_empty() {
                    return Err(EngineError::constraint(format!(
                        "existing records violate unique index '{name}'"
                    )));
                }
                owners.insert(key.clone());
            }
        }
        self.indexes.insert(name.to_string(), IndexData { params, entries });
        Ok(())
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("index '{name}'")))
    }

    /// Finds the record following `after` in `direction`, or the first one
    /// when `after` is `None`. Positions are `(key, primary key)` pairs.
    pub(crate) fn seek(
        &self,
        index: Option<&str>,
        range: Option<&KeyRange>,
        direction: Direction,
        after: Option<&(Key, Key)>,
    ) -> EngineResult<Option<Hit>> {
        let position = match index {
            Some(name) => seek_index(self.index(name)?, range, direction, after),
            None => self.seek_records(range, direction, after),
        };
        let Some((key, primary_key)) = position else {
            return Ok(None);
        };
        let value = self
            .decode(&primary_key)?
            .ok_or_else(|| {
                EngineError::invalid_state(format!("index points at missing record {primary_key}"))
            })?;
        Ok(Some(Hit {
            key,
            primary_key,
            value,
        }))
    }

    fn seek_records(
        &self,
        range: Option<&KeyRange>,
        direction: Direction,
        after: Option<&(Key, Key)>,
    ) -> Option<(Key, Key)> {
        let (lower, upper) = bounds(range);
        let found = if direction.is_reverse() {
            let upper = after.map_or(upper, |(key, _)| Excluded(key.clone()));
            self.records.range((lower, upper)).next_back()
        } else {
            let lower = after.map_or(lower, |(key, _)| Excluded(key.clone()));
            self.records.range((lower, upper)).next()
        };
        found.map(|(key, _)| (key.clone(), key.clone()))
    }
}

fn seek_index(
    index: &IndexData,
    range: Option<&KeyRange>,
    direction: Direction,
    after: Option<&(Key, Key)>,
) -> Option<(Key, Key)> {
    let (lower, upper) = bounds(range);

    // Duplicate index keys are visited in primary key order before moving on.
    if let (Some((key, primary_key)), false) = (after, direction.is_unique()) {
        let owners = index.entries.get(key);
        let sibling = if direction.is_reverse() {
            owners.and_then(|owners| owners.range(..primary_key.clone()).next_back())
        } else {
            owners.and_then(|owners| {
                owners
                    .range((Excluded(primary_key.clone()), Unbounded))
                    .next()
            })
        };
        if let Some(sibling) = sibling {
            return Some((key.clone(), sibling.clone()));
        }
    }

    if direction.is_reverse() {
        let upper = after.map_or(upper, |(key, _)| Excluded(key.clone()));
        let (key, owners) = index.entries.range((lower, upper)).next_back()?;
        // prevunique reports the lowest primary key of each index key
        let primary_key = (if direction.is_unique() {
            owners.first()
        } else {
            owners.last()
        })?;
        Some((key.clone(), primary_key.clone()))
    } else {
        let lower = after.map_or(lower, |(key, _)| Excluded(key.clone()));
        let (key, owners) = index.entries.range((lower, upper)).next()?;
        Some((key.clone(), owners.first()?.clone()))
    }
}
