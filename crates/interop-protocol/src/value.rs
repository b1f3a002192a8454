//! In-process representation of every value that crosses the wire.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::codec::{self, MAP_DISCRIMINATOR};

/// A marshaled value.
///
/// `Mapping` and `Object` are both JSON objects on the wire; the codec tells
/// them apart by the [`MAP_DISCRIMINATOR`] key. `Object` keeps the raw JSON of
/// a structured value whose shape only the target method knows.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<DynamicValue>),
    Mapping(Mapping),
    Object(serde_json::Map<String, Value>),
}

impl DynamicValue {
    /// Short name of the variant, used in coercion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
            Self::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[DynamicValue]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for DynamicValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for DynamicValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for DynamicValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for DynamicValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for DynamicValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<DynamicValue>> for DynamicValue {
    fn from(items: Vec<DynamicValue>) -> Self {
        Self::Sequence(items)
    }
}

impl From<Mapping> for DynamicValue {
    fn from(m: Mapping) -> Self {
        Self::Mapping(m)
    }
}

/// Wire form: Mapping gains the discriminator, Float keeps its fraction.
impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(_) => serializer.serialize_unit(),
            Self::String(s) => serializer.serialize_str(s),
            Self::Sequence(items) => items.serialize(serializer),
            Self::Mapping(mapping) => {
                let mut map = serializer.serialize_map(None)?;
                for (key, value) in mapping.iter().filter(|(k, _)| *k != MAP_DISCRIMINATOR) {
                    map.serialize_entry(key, value)?;
                }
                map.serialize_entry(MAP_DISCRIMINATOR, &true)?;
                map.end()
            }
            Self::Object(object) => object.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        codec::from_wire(raw).map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mapping
// ─────────────────────────────────────────────────────────────────────────────

/// String-keyed collection with unique keys, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: IndexMap<String, DynamicValue>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: DynamicValue) -> Option<DynamicValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a key; the remaining entries keep their order.
    pub fn remove(&mut self, key: &str) -> Option<DynamicValue> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DynamicValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Equal when both hold the same entries in the same order.
impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len() && self.entries.iter().eq(other.entries.iter())
    }
}

impl<K: Into<String>> FromIterator<(K, DynamicValue)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, DynamicValue)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl IntoIterator for Mapping {
    type Item = (String, DynamicValue);
    type IntoIter = indexmap::map::IntoIter<String, DynamicValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
