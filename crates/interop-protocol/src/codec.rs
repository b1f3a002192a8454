//! Wire codec: JSON bytes <-> [`DynamicValue`].
//!
//! Plain JSON loses two facts the backend needs: whether an object is a
//! key/value map or a structured value, and whether a number was written as
//! an integer. The first is carried by the [`MAP_DISCRIMINATOR`] key, the
//! second by the number's lexical form (`5` vs `5.0`).

use serde_json::{Number, Value};

use crate::error::BridgeError;
use crate::value::{DynamicValue, Mapping};

/// Reserved key marking a JSON object as a Mapping. Never a Mapping entry.
pub const MAP_DISCRIMINATOR: &str = "__is_map__";

/// Deepest nesting of sequences, mappings and objects accepted on decode.
pub const MAX_DEPTH: usize = 64;

/// Decode one wire value.
pub fn decode(bytes: &[u8]) -> Result<DynamicValue, BridgeError> {
    let raw: Value = serde_json::from_slice(bytes)
        .map_err(|e| BridgeError::malformed(format!("Invalid JSON: {e}")))?;
    from_wire(raw)
}

/// Encode one wire value.
pub fn encode(value: &DynamicValue) -> Result<Vec<u8>, BridgeError> {
    serde_json::to_vec(value).map_err(|e| BridgeError::internal(format!("Failed to encode value: {e}")))
}

/// Classify an already-parsed JSON value.
pub fn from_wire(raw: Value) -> Result<DynamicValue, BridgeError> {
    decode_value(raw, 0)
}

/// JSON form of a value, discriminator included.
pub fn to_wire(value: &DynamicValue) -> Value {
    match value {
        DynamicValue::Null => Value::Null,
        DynamicValue::Boolean(b) => Value::Bool(*b),
        DynamicValue::Integer(i) => Value::Number((*i).into()),
        DynamicValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        DynamicValue::String(s) => Value::String(s.clone()),
        DynamicValue::Sequence(items) => Value::Array(items.iter().map(to_wire).collect()),
        DynamicValue::Mapping(mapping) => {
            let mut object: serde_json::Map<String, Value> = mapping
                .iter()
                .filter(|(k, _)| *k != MAP_DISCRIMINATOR)
                .map(|(k, v)| (k.to_string(), to_wire(v)))
                .collect();
            object.insert(MAP_DISCRIMINATOR.to_string(), Value::Bool(true));
            Value::Object(object)
        }
        DynamicValue::Object(object) => Value::Object(object.clone()),
    }
}

/// JSON form without discriminators, for structural deserialization into
/// typed parameters.
pub fn to_plain_json(value: &DynamicValue) -> Value {
    match value {
        DynamicValue::Sequence(items) => Value::Array(items.iter().map(to_plain_json).collect()),
        DynamicValue::Mapping(mapping) => Value::Object(
            mapping
                .iter()
                .map(|(k, v)| (k.to_string(), to_plain_json(v)))
                .collect(),
        ),
        other => to_wire(other),
    }
}

/// Lift a backend-produced JSON value. Objects stay opaque; no depth bound
/// applies since the value never came off the wire.
pub fn lift(raw: Value) -> DynamicValue {
    match raw {
        Value::Null => DynamicValue::Null,
        Value::Bool(b) => DynamicValue::Boolean(b),
        Value::Number(n) => classify_number(&n),
        Value::String(s) => DynamicValue::String(s),
        Value::Array(items) => DynamicValue::Sequence(items.into_iter().map(lift).collect()),
        Value::Object(object) => DynamicValue::Object(object),
    }
}

fn classify_number(n: &Number) -> DynamicValue {
    match n.as_i64() {
        Some(i) => DynamicValue::Integer(i),
        None => DynamicValue::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Presence of the discriminator marks a Mapping, whatever its value.
fn is_mapping(object: &serde_json::Map<String, Value>) -> bool {
    object.contains_key(MAP_DISCRIMINATOR)
}

fn decode_value(raw: Value, depth: usize) -> Result<DynamicValue, BridgeError> {
    match raw {
        Value::Null => Ok(DynamicValue::Null),
        Value::Bool(b) => Ok(DynamicValue::Boolean(b)),
        Value::Number(n) => Ok(classify_number(&n)),
        Value::String(s) => Ok(DynamicValue::String(s)),
        Value::Array(items) => {
            check_depth(depth + 1)?;
            items
                .into_iter()
                .map(|item| decode_value(item, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(DynamicValue::Sequence)
        }
        Value::Object(object) if is_mapping(&object) => {
            check_depth(depth + 1)?;
            let mut mapping = Mapping::with_capacity(object.len());
            for (key, value) in object {
                if key == MAP_DISCRIMINATOR {
                    continue;
                }
                mapping.insert(key, decode_value(value, depth + 1)?);
            }
            Ok(DynamicValue::Mapping(mapping))
        }
        Value::Object(object) => {
            check_depth(depth + 1)?;
            for value in object.values() {
                check_raw_depth(value, depth + 1)?;
            }
            Ok(DynamicValue::Object(object))
        }
    }
}

fn check_raw_depth(raw: &Value, depth: usize) -> Result<(), BridgeError> {
    match raw {
        Value::Array(items) => {
            check_depth(depth + 1)?;
            items.iter().try_for_each(|item| check_raw_depth(item, depth + 1))
        }
        Value::Object(object) => {
            check_depth(depth + 1)?;
            object.values().try_for_each(|value| check_raw_depth(value, depth + 1))
        }
        _ => Ok(()),
    }
}

fn check_depth(depth: usize) -> Result<(), BridgeError> {
    if depth > MAX_DEPTH {
        return Err(BridgeError::malformed(format!(
            "Value nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested_arrays(levels: usize) -> Value {
        let mut value = json!(1);
        for _ in 0..levels {
            value = json!([value]);
        }
        value
    }

    #[test]
    fn integer_and_float_stay_distinct() {
        assert_eq!(decode(b"5").unwrap(), DynamicValue::Integer(5));
        assert_eq!(decode(b"5.0").unwrap(), DynamicValue::Float(5.0));
        assert_eq!(decode(b"1e3").unwrap(), DynamicValue::Float(1000.0));
        assert_eq!(encode(&DynamicValue::Float(5.0)).unwrap(), b"5.0");
        assert_eq!(encode(&DynamicValue::Integer(5)).unwrap(), b"5");
    }

    #[test]
    fn integer_beyond_i64_becomes_float() {
        let decoded = decode(b"18446744073709551615").unwrap();
        assert!(matches!(decoded, DynamicValue::Float(_)));
    }

    #[test]
    fn discriminator_marks_mapping_and_is_stripped() {
        let decoded = from_wire(json!({"a": 1, "__is_map__": true})).unwrap();
        let mapping = decoded.as_mapping().unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("a"), Some(&DynamicValue::Integer(1)));
        assert!(!mapping.contains_key(MAP_DISCRIMINATOR));
    }

    #[test]
    fn object_without_discriminator_is_opaque() {
        let decoded = from_wire(json!({"a": 1})).unwrap();
        assert!(matches!(decoded, DynamicValue::Object(_)));
    }

    #[test]
    fn any_discriminator_value_marks_mapping() {
        for marker in [json!(1), json!(false), json!("yes"), Value::Null] {
            let decoded = from_wire(json!({"a": 1, "__is_map__": marker})).unwrap();
            let mapping = decoded.as_mapping().unwrap();
            assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["a"]);
        }
    }

    #[test]
    fn large_mapping_decodes_in_linear_time() {
        let mut body = String::from("{");
        for i in 0..100_000 {
            body.push_str(&format!("\"k{i}\":{i},"));
        }
        body.push_str("\"__is_map__\":true}");

        let started = std::time::Instant::now();
        let decoded = decode(body.as_bytes()).unwrap();
        let elapsed = started.elapsed();

        let mapping = decoded.as_mapping().unwrap();
        assert_eq!(mapping.len(), 100_000);
        assert_eq!(mapping.get("k99999"), Some(&DynamicValue::Integer(99_999)));
        assert_eq!(mapping.keys().next(), Some("k0"));
        assert!(elapsed < std::time::Duration::from_secs(5), "decode took {elapsed:?}");
    }

    #[test]
    fn mapping_remove_keeps_order() {
        let mut mapping: Mapping = [
            ("a", DynamicValue::Integer(1)),
            ("b", DynamicValue::Integer(2)),
            ("c", DynamicValue::Integer(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(mapping.remove("a"), Some(DynamicValue::Integer(1)));
        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(mapping.insert("b", DynamicValue::Null), Some(DynamicValue::Integer(2)));
        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn mapping_encodes_entries_then_discriminator() {
        let mapping: Mapping = [("b", DynamicValue::Integer(2)), ("a", DynamicValue::Float(1.5))]
            .into_iter()
            .collect();
        let bytes = encode(&DynamicValue::Mapping(mapping)).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"b":2,"a":1.5,"__is_map__":true}"#
        );
    }

    #[test]
    fn reserved_key_in_mapping_is_not_emitted_twice() {
        let mut mapping = Mapping::new();
        mapping.insert(MAP_DISCRIMINATOR, DynamicValue::Boolean(false));
        mapping.insert("x", DynamicValue::Null);
        let wire = to_wire(&DynamicValue::Mapping(mapping));
        assert_eq!(wire, json!({"x": null, "__is_map__": true}));
    }

    #[test]
    fn non_finite_float_encodes_as_null() {
        assert_eq!(encode(&DynamicValue::Float(f64::NAN)).unwrap(), b"null");
        assert_eq!(to_wire(&DynamicValue::Float(f64::INFINITY)), Value::Null);
    }

    #[test]
    fn depth_at_limit_is_accepted() {
        assert!(from_wire(nested_arrays(MAX_DEPTH)).is_ok());
    }

    #[test]
    fn depth_beyond_limit_is_malformed() {
        let err = from_wire(nested_arrays(MAX_DEPTH + 1)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedRequest);
    }

    #[test]
    fn depth_is_counted_inside_opaque_objects() {
        let deep = json!({ "inner": nested_arrays(MAX_DEPTH) });
        assert!(from_wire(deep).is_err());
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = decode(b"{not json").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedRequest);
    }

    #[test]
    fn plain_json_drops_discriminator() {
        let mapping: Mapping = [("k", DynamicValue::from("v"))].into_iter().collect();
        assert_eq!(to_plain_json(&DynamicValue::Mapping(mapping)), json!({"k": "v"}));
    }

    #[test]
    fn lift_keeps_objects_opaque() {
        let lifted = lift(json!([{"a": 1}, 2, 2.5]));
        let items = lifted.as_sequence().unwrap();
        assert!(matches!(items[0], DynamicValue::Object(_)));
        assert_eq!(items[1], DynamicValue::Integer(2));
        assert_eq!(items[2], DynamicValue::Float(2.5));
    }
}
