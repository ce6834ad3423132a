//! Typed accessors over argument and result maps.
//!
//! Shared by [`crate::Request`] args and [`crate::Response`] result fields.

use serde_json::{Map, Value};

use crate::error::FieldError;

/// Look up a field, failing if absent.
pub fn get_value<'a>(map: Option<&'a Map<String, Value>>, field: &str) -> Result<&'a Value, FieldError> {
    map.and_then(|m| m.get(field))
        .ok_or_else(|| FieldError::missing(field))
}

/// Look up a string field.
pub fn get_string<'a>(map: Option<&'a Map<String, Value>>, field: &str) -> Result<&'a str, FieldError> {
    get_value(map, field)?
        .as_str()
        .ok_or_else(|| FieldError::wrong_type(field, "a string"))
}

/// Look up an integer field. Accepts any JSON integer that fits in `i64`.
pub fn get_integer(map: Option<&Map<String, Value>>, field: &str) -> Result<i64, FieldError> {
    get_value(map, field)?
        .as_i64()
        .ok_or_else(|| FieldError::wrong_type(field, "an integer"))
}

/// Look up a boolean field.
pub fn get_boolean(map: Option<&Map<String, Value>>, field: &str) -> Result<bool, FieldError> {
    get_value(map, field)?
        .as_bool()
        .ok_or_else(|| FieldError::wrong_type(field, "a boolean"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "name": "diary",
            "count": 3,
            "big": 18446744073709551615u64,
            "ratio": 1.5,
            "flag": true
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn test_typed_access() {
        let map = sample();
        assert_eq!(get_string(Some(&map), "name").unwrap(), "diary");
        assert_eq!(get_integer(Some(&map), "count").unwrap(), 3);
        assert!(get_boolean(Some(&map), "flag").unwrap());
    }

    #[test]
    fn test_missing_field() {
        let map = sample();
        assert_eq!(
            get_string(Some(&map), "absent"),
            Err(FieldError::Missing { field: "absent".into() })
        );
        assert!(matches!(get_boolean(None, "flag"), Err(FieldError::Missing { .. })));
    }

    #[test]
    fn test_wrong_type_is_not_defaulted() {
        let map = sample();
        assert!(matches!(get_integer(Some(&map), "name"), Err(FieldError::WrongType { .. })));
        assert!(matches!(get_integer(Some(&map), "ratio"), Err(FieldError::WrongType { .. })));
        assert!(matches!(get_integer(Some(&map), "big"), Err(FieldError::WrongType { .. })));
        assert!(matches!(get_boolean(Some(&map), "count"), Err(FieldError::WrongType { .. })));
        assert!(matches!(get_string(Some(&map), "flag"), Err(FieldError::WrongType { .. })));
    }
}
