//! Payload sanitization between the script engine and the HTTP boundary
//!
//! Submission payloads cross the system boundary as JSON, so nothing
//! engine-specific may survive: maps become objects, arrays become sequences,
//! engine ints/floats become plain numbers. Applied recursively; cycles are
//! not detected (a self-referential map would recurse without bound, but the
//! engine's own limits make such a value impossible to build in a fragment).

use rhai::{Array, Dynamic, ImmutableString, Map};
use serde_json::{Map as JsonMap, Number, Value};

/// Convert an engine value into a portable JSON value.
///
/// Unknown custom types fall back to their display form rather than failing,
/// so a fragment that stuffs something exotic into its payload still produces
/// a submittable value.
pub fn sanitize(value: &Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        let mut object = JsonMap::with_capacity(map.len());
        for (key, item) in map {
            object.insert(key.to_string(), sanitize(&item));
        }
        return Value::Object(object);
    }
    if let Some(array) = value.clone().try_cast::<Array>() {
        return Value::Array(array.iter().map(sanitize).collect());
    }
    if let Ok(flag) = value.as_bool() {
        return Value::Bool(flag);
    }
    if let Ok(int) = value.as_int() {
        return Value::Number(Number::from(int));
    }
    if let Ok(float) = value.as_float() {
        // NaN/infinity have no JSON representation
        return Number::from_f64(float).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Some(text) = value.clone().try_cast::<ImmutableString>() {
        return Value::String(text.as_str().to_string());
    }
    Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_dynamic(value: &Value) -> Dynamic {
        rhai::serde::to_dynamic(value).unwrap()
    }

    #[test]
    fn test_sanitize_scalars() {
        assert_eq!(sanitize(&Dynamic::from(42_i64)), json!(42));
        assert_eq!(sanitize(&Dynamic::from(2.5_f64)), json!(2.5));
        assert_eq!(sanitize(&Dynamic::from(true)), json!(true));
        assert_eq!(sanitize(&Dynamic::from("hello".to_string())), json!("hello"));
        assert_eq!(sanitize(&Dynamic::UNIT), Value::Null);
    }

    #[test]
    fn test_sanitize_array_yields_plain_integers() {
        let array: Array = vec![
            Dynamic::from(1_i64),
            Dynamic::from(2_i64),
            Dynamic::from(3_i64),
        ];
        let result = sanitize(&Dynamic::from(array));
        assert_eq!(result, json!([1, 2, 3]));
        for item in result.as_array().unwrap() {
            assert!(item.is_i64());
        }
    }

    #[test]
    fn test_sanitize_nested_map() {
        let mut inner = Map::new();
        inner.insert("count".into(), Dynamic::from(7_i64));
        let mut outer = Map::new();
        outer.insert("answer".into(), Dynamic::from(inner));
        outer.insert(
            "values".into(),
            Dynamic::from(vec![Dynamic::from(1_i64), Dynamic::UNIT] as Array),
        );

        let result = sanitize(&Dynamic::from(outer));
        assert_eq!(result, json!({"answer": {"count": 7}, "values": [1, null]}));
    }

    #[test]
    fn test_sanitize_is_idempotent_over_portable_values() {
        let cases = vec![
            json!({"a": [1, 2, 3], "b": {"c": "text", "d": 1.5}}),
            json!([{"x": true}, null, "y", 9]),
            json!(123),
        ];
        for case in cases {
            let once = sanitize(&to_dynamic(&case));
            let twice = sanitize(&to_dynamic(&once));
            assert_eq!(once, twice);
            assert_eq!(once, case);
        }
    }

    #[test]
    fn test_sanitize_non_finite_float_is_null() {
        assert_eq!(sanitize(&Dynamic::from(f64::NAN)), Value::Null);
        assert_eq!(sanitize(&Dynamic::from(f64::INFINITY)), Value::Null);
    }
}
