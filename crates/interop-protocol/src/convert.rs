//! Typed coercion between [`DynamicValue`] and method parameter/result types.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec;
use crate::error::BridgeError;
use crate::value::{DynamicValue, Mapping};

/// Largest integer magnitude an `f64` represents exactly.
const F64_EXACT_INT: u64 = 1 << 53;

/// Why a value could not be coerced to a parameter type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: String,
    pub found: String,
}

impl Mismatch {
    pub fn new(expected: impl Into<String>, value: &DynamicValue) -> Self {
        Self {
            expected: expected.into(),
            found: value.type_name().to_string(),
        }
    }

    pub fn describe(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

/// Parameter types a method may declare.
pub trait FromDynamic: Sized {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch>;
}

/// Result types a method may return.
pub trait IntoDynamic {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError>;
}

/// Wrapper for structured values that travel through serde.
///
/// As a parameter, any value is deserialized structurally into `T`. As a
/// result, `T` is serialized and sent as an opaque object.
#[derive(Debug, Clone, PartialEq)]
pub struct Structured<T>(pub T);

// ─────────────────────────────────────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────────────────────────────────────

impl FromDynamic for DynamicValue {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        Ok(value)
    }
}

impl FromDynamic for Value {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        Ok(codec::to_wire(&value))
    }
}

impl FromDynamic for bool {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        match value {
            DynamicValue::Boolean(b) => Ok(b),
            other => Err(Mismatch::new("boolean", &other)),
        }
    }
}

impl FromDynamic for String {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        match value {
            DynamicValue::String(s) => Ok(s),
            other => Err(Mismatch::new("string", &other)),
        }
    }
}

fn integer(value: &DynamicValue) -> Result<i64, Mismatch> {
    match value {
        DynamicValue::Integer(i) => Ok(*i),
        DynamicValue::Float(f)
            if f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
        {
            Ok(*f as i64)
        }
        other => Err(Mismatch::new("integer", other)),
    }
}

macro_rules! integer_param {
    ($($ty:ty),*) => {
        $(
            impl FromDynamic for $ty {
                fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
                    let i = integer(&value)?;
                    <$ty>::try_from(i).map_err(|_| {
                        Mismatch::describe(
                            concat!("integer within ", stringify!($ty)),
                            i.to_string(),
                        )
                    })
                }
            }
        )*
    };
}

integer_param!(i32, i64, u32, u64, usize);

impl FromDynamic for f64 {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        match value {
            DynamicValue::Float(f) => Ok(f),
            DynamicValue::Integer(i) if i.unsigned_abs() <= F64_EXACT_INT => Ok(i as f64),
            other => Err(Mismatch::new("float", &other)),
        }
    }
}

impl FromDynamic for f32 {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        let found = value.type_name();
        let f = f64::from_dynamic(value)?;
        let narrowed = f as f32;
        if f64::from(narrowed) == f || f.is_nan() {
            Ok(narrowed)
        } else {
            Err(Mismatch::describe(format!("float within f32 ({f})"), found))
        }
    }
}

impl<T: FromDynamic> FromDynamic for Option<T> {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        match value {
            DynamicValue::Null => Ok(None),
            other => T::from_dynamic(other).map(Some),
        }
    }
}

impl<T: FromDynamic> FromDynamic for Vec<T> {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        match value {
            DynamicValue::Sequence(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    T::from_dynamic(item).map_err(|m| {
                        Mismatch::describe(format!("element {index}: {}", m.expected), m.found)
                    })
                })
                .collect(),
            other => Err(Mismatch::new("sequence", &other)),
        }
    }
}

impl FromDynamic for Mapping {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        match value {
            DynamicValue::Mapping(m) => Ok(m),
            other => Err(Mismatch::new("mapping", &other)),
        }
    }
}

fn mapping_entries<T: FromDynamic>(
    value: DynamicValue,
) -> Result<impl Iterator<Item = Result<(String, T), Mismatch>>, Mismatch> {
    let mapping = Mapping::from_dynamic(value)?;
    Ok(mapping.into_iter().map(|(key, item)| {
        T::from_dynamic(item)
            .map(|v| (key.clone(), v))
            .map_err(|m| Mismatch::describe(format!("entry {key:?}: {}", m.expected), m.found))
    }))
}

impl<T: FromDynamic> FromDynamic for HashMap<String, T> {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        mapping_entries(value)?.collect()
    }
}

impl<T: FromDynamic> FromDynamic for BTreeMap<String, T> {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        mapping_entries(value)?.collect()
    }
}

impl<T: DeserializeOwned> FromDynamic for Structured<T> {
    fn from_dynamic(value: DynamicValue) -> Result<Self, Mismatch> {
        let found = value.type_name();
        serde_json::from_value(codec::to_plain_json(&value))
            .map(Structured)
            .map_err(|e| Mismatch::describe(format!("structured value ({e})"), found))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

impl IntoDynamic for () {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(DynamicValue::Null)
    }
}

impl IntoDynamic for DynamicValue {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(self)
    }
}

impl IntoDynamic for Value {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(codec::lift(self))
    }
}

impl IntoDynamic for Mapping {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(DynamicValue::Mapping(self))
    }
}

impl IntoDynamic for bool {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(DynamicValue::Boolean(self))
    }
}

impl IntoDynamic for String {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(DynamicValue::String(self))
    }
}

impl IntoDynamic for &str {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(DynamicValue::String(self.to_string()))
    }
}

macro_rules! integer_result {
    ($($ty:ty),*) => {
        $(
            impl IntoDynamic for $ty {
                fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
                    Ok(DynamicValue::Integer(i64::from(self)))
                }
            }
        )*
    };
}

integer_result!(i32, i64, u32);

impl IntoDynamic for u64 {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(match i64::try_from(self) {
            Ok(i) => DynamicValue::Integer(i),
            Err(_) => DynamicValue::Float(self as f64),
        })
    }
}

impl IntoDynamic for usize {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        (self as u64).into_dynamic()
    }
}

impl IntoDynamic for f64 {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(DynamicValue::Float(self))
    }
}

impl IntoDynamic for f32 {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        Ok(DynamicValue::Float(f64::from(self)))
    }
}

impl<T: IntoDynamic> IntoDynamic for Option<T> {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        match self {
            Some(value) => value.into_dynamic(),
            None => Ok(DynamicValue::Null),
        }
    }
}

impl<T: IntoDynamic> IntoDynamic for Vec<T> {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        self.into_iter()
            .map(IntoDynamic::into_dynamic)
            .collect::<Result<Vec<_>, _>>()
            .map(DynamicValue::Sequence)
    }
}

impl<T: IntoDynamic> IntoDynamic for HashMap<String, T> {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        let mut entries: Vec<(String, T)> = self.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries_into_mapping(entries)
    }
}

impl<T: IntoDynamic> IntoDynamic for BTreeMap<String, T> {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        entries_into_mapping(self)
    }
}

fn entries_into_mapping<T: IntoDynamic>(
    entries: impl IntoIterator<Item = (String, T)>,
) -> Result<DynamicValue, BridgeError> {
    let mut mapping = Mapping::new();
    for (key, value) in entries {
        mapping.insert(key, value.into_dynamic()?);
    }
    Ok(DynamicValue::Mapping(mapping))
}

impl<T: Serialize> IntoDynamic for Structured<T> {
    fn into_dynamic(self) -> Result<DynamicValue, BridgeError> {
        serde_json::to_value(&self.0)
            .map(codec::lift)
            .map_err(|e| BridgeError::internal(format!("Failed to serialize result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn integer_accepted_for_float_parameter() {
        assert_eq!(f64::from_dynamic(DynamicValue::Integer(5)), Ok(5.0));
    }

    #[test]
    fn integral_float_accepted_for_integer_parameter() {
        assert_eq!(i32::from_dynamic(DynamicValue::Float(7.0)), Ok(7));
    }

    #[test]
    fn fractional_float_rejected_for_integer_parameter() {
        let err = i64::from_dynamic(DynamicValue::Float(7.5)).unwrap_err();
        assert_eq!(err.expected, "integer");
        assert_eq!(err.found, "float");
    }

    #[test]
    fn huge_integer_rejected_for_float_parameter() {
        assert!(f64::from_dynamic(DynamicValue::Integer(i64::MAX)).is_err());
    }

    #[test]
    fn f32_parameter_requires_exact_value() {
        assert_eq!(f32::from_dynamic(DynamicValue::Float(0.5)), Ok(0.5));
        assert_eq!(f32::from_dynamic(DynamicValue::Integer(3)), Ok(3.0));
        assert!(f32::from_dynamic(DynamicValue::Float(0.1)).is_err());
        assert!(f32::from_dynamic(DynamicValue::Float(1e300)).is_err());
        assert!(f32::from_dynamic(DynamicValue::Integer((1 << 24) + 1)).is_err());
    }

    #[test]
    fn out_of_range_integer_rejected() {
        let err = i32::from_dynamic(DynamicValue::Integer(i64::from(i32::MAX) + 1)).unwrap_err();
        assert!(err.expected.contains("i32"));
    }

    #[test]
    fn mapping_only_for_map_parameters() {
        let mapping: Mapping = [("a", DynamicValue::Integer(1))].into_iter().collect();
        let map = HashMap::<String, i64>::from_dynamic(DynamicValue::Mapping(mapping)).unwrap();
        assert_eq!(map.get("a"), Some(&1));

        let object = serde_json::json!({"a": 1}).as_object().cloned().unwrap();
        let err = HashMap::<String, i64>::from_dynamic(DynamicValue::Object(object)).unwrap_err();
        assert_eq!(err.found, "object");
    }

    #[test]
    fn sequence_element_failure_names_the_element() {
        let seq = DynamicValue::Sequence(vec![DynamicValue::from("a"), DynamicValue::Integer(1)]);
        let err = Vec::<String>::from_dynamic(seq).unwrap_err();
        assert_eq!(err.to_string(), "expected element 1: string, found integer");
    }

    #[test]
    fn null_is_none_for_optional_parameter() {
        assert_eq!(Option::<String>::from_dynamic(DynamicValue::Null), Ok(None));
    }

    #[test]
    fn structured_parameter_deserializes_objects_and_mappings() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Point {
            x: i32,
            y: i32,
        }

        let object = serde_json::json!({"x": 1, "y": 2}).as_object().cloned().unwrap();
        let Structured(p) = Structured::<Point>::from_dynamic(DynamicValue::Object(object)).unwrap();
        assert_eq!(p, Point { x: 1, y: 2 });

        let mapping: Mapping = [("x", DynamicValue::Integer(3)), ("y", DynamicValue::Integer(4))]
            .into_iter()
            .collect();
        let Structured(p) = Structured::<Point>::from_dynamic(DynamicValue::Mapping(mapping)).unwrap();
        assert_eq!(p, Point { x: 3, y: 4 });
    }

    #[test]
    fn structured_result_is_opaque_object() {
        #[derive(Serialize)]
        struct Info {
            name: &'static str,
        }
        let value = Structured(Info { name: "n" }).into_dynamic().unwrap();
        assert!(matches!(value, DynamicValue::Object(_)));
    }

    #[test]
    fn btree_result_is_mapping_in_key_order() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), 2i64);
        map.insert("a".to_string(), 1i64);
        let value = map.into_dynamic().unwrap();
        let keys: Vec<&str> = value.as_mapping().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
