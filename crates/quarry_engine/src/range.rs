//! Key ranges and cursor directions.

use crate::error::{EngineError, EngineResult};
use quarry_codec::{cmp_keys, Key, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A contiguous interval of keys, optionally open at either end.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

pub(crate) fn to_key(value: Value) -> EngineResult<Key> {
    let kind = value.kind();
    Key::new(value).ok_or_else(|| EngineError::data(format!("{kind} is not a valid key")))
}

impl KeyRange {
    /// The range covering every key.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The range containing exactly `value`.
    pub fn only(value: impl Into<Value>) -> EngineResult<Self> {
        let key = to_key(value.into())?;
        Ok(Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        })
    }

    /// The range between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Fails if either bound is not a valid key, if `lower > upper`, or if
    /// the bounds are equal and either end is open.
    pub fn bound(
        lower: impl Into<Value>,
        upper: impl Into<Value>,
        lower_open: bool,
        upper_open: bool,
    ) -> EngineResult<Self> {
        let lower = to_key(lower.into())?;
        let upper = to_key(upper.into())?;
        match lower.cmp(&upper) {
            Ordering::Greater => {
                return Err(EngineError::data(format!(
                    "lower bound {lower} is greater than upper bound {upper}"
                )))
            }
            Ordering::Equal if lower_open || upper_open => {
                return Err(EngineError::data(format!("range around {lower} is empty")))
            }
            _ => {}
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// Every key at or above (`open`: strictly above) `lower`.
    pub fn lower_bound(lower: impl Into<Value>, open: bool) -> EngineResult<Self> {
        Ok(Self {
            lower: Some(to_key(lower.into())?),
            lower_open: open,
            ..Self::default()
        })
    }

    /// Every key at or below (`open`: strictly below) `upper`.
    pub fn upper_bound(upper: impl Into<Value>, open: bool) -> EngineResult<Self> {
        Ok(Self {
            upper: Some(to_key(upper.into())?),
            upper_open: open,
            ..Self::default()
        })
    }

    /// Builds a range from a value.
    ///
    /// A map with any of `gt`, `gte`, `lt`, `lte` describes bounds; any
    /// other value is treated as a single key.
    pub fn parse(value: &Value) -> EngineResult<Self> {
        let Value::Map(_) = value else {
            return Self::only(value.clone());
        };
        let lower = match (value.get("gt"), value.get("gte")) {
            (Some(_), Some(_)) => return Err(EngineError::data("both gt and gte given")),
            (Some(v), None) => Some((v.clone(), true)),
            (None, Some(v)) => Some((v.clone(), false)),
            (None, None) => None,
        };
        let upper = match (value.get("lt"), value.get("lte")) {
            (Some(_), Some(_)) => return Err(EngineError::data("both lt and lte given")),
            (Some(v), None) => Some((v.clone(), true)),
            (None, Some(v)) => Some((v.clone(), false)),
            (None, None) => None,
        };
        match (lower, upper) {
            (Some((lo, lo_open)), Some((hi, hi_open))) => Self::bound(lo, hi, lo_open, hi_open),
            (Some((lo, open)), None) => Self::lower_bound(lo, open),
            (None, Some((hi, open))) => Self::upper_bound(hi, open),
            (None, None) => Err(EngineError::data(
                "range map needs one of gt, gte, lt, lte",
            )),
        }
    }

    /// Lower bound, if any.
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// Upper bound, if any.
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound is excluded.
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound is excluded.
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// Checks whether `key` falls inside the range.
    pub fn includes(&self, key: &Value) -> bool {
        if let Some(lower) = &self.lower {
            match cmp_keys(key, lower.as_value()) {
                Ordering::Less => return false,
                Ordering::Equal if self.lower_open => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match cmp_keys(key, upper.as_value()) {
                Ordering::Greater => return false,
                Ordering::Equal if self.upper_open => return false,
                _ => {}
            }
        }
        true
    }
}

/// Order in which a cursor visits records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Next,
    /// Ascending, first record per distinct key only.
    NextUnique,
    /// Descending key order.
    Prev,
    /// Descending, first record per distinct key only.
    PrevUnique,
}

impl Direction {
    /// Whether keys are visited in descending order.
    pub fn is_reverse(self) -> bool {
        matches!(self, Direction::Prev | Direction::PrevUnique)
    }

    /// Whether duplicate keys are skipped.
    pub fn is_unique(self) -> bool {
        matches!(self, Direction::NextUnique | Direction::PrevUnique)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Next => "next",
            Direction::NextUnique => "nextunique",
            Direction::Prev => "prev",
            Direction::PrevUnique => "prevunique",
        })
    }
}

impl FromStr for Direction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Direction::Next),
            "nextunique" => Ok(Direction::NextUnique),
            "prev" => Ok(Direction::Prev),
            "prevunique" => Ok(Direction::PrevUnique),
            other => Err(EngineError::data(format!("unknown direction '{other}'"))),
        }
    }
}
