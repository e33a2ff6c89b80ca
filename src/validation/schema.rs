//! Field-level shape checks over untyped JSON values
//!
//! Each combinator looks up one key of a JSON object and either returns a
//! typed value or a [`ShapeError`] naming the key. Validators for concrete
//! entry kinds are built by applying these per field.

use crate::core::error::ShapeError;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// JSON kind of a value, as reported in shape errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
}

impl JsonKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => JsonKind::String,
            Value::Number(_) => JsonKind::Number,
            Value::Bool(_) => JsonKind::Boolean,
            Value::Object(_) => JsonKind::Object,
            Value::Array(_) => JsonKind::Array,
            Value::Null => JsonKind::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonKind::String => "string",
            JsonKind::Number => "number",
            JsonKind::Boolean => "boolean",
            JsonKind::Object => "object",
            JsonKind::Array => "array",
            JsonKind::Null => "null",
        }
    }
}

/// Look up `key` in `obj` and check its kind.
///
/// A non-object `obj` always reports the key as missing, even when the key
/// is optional. An absent optional key yields `Ok(None)`.
pub fn expect_key<'a>(
    obj: &'a Value,
    key: &str,
    expected: JsonKind,
    optional: bool,
) -> Result<Option<&'a Value>, ShapeError> {
    let Some(map) = obj.as_object() else {
        return Err(missing(obj, key));
    };

    match map.get(key) {
        None if optional => Ok(None),
        None => Err(missing(obj, key)),
        Some(value) => {
            let actual = JsonKind::of(value);
            if actual != expected {
                return Err(ShapeError::WrongType {
                    key: key.to_string(),
                    expected: expected.as_str(),
                    actual: actual.as_str(),
                    object: obj.to_string(),
                });
            }
            Ok(Some(value))
        }
    }
}

pub fn required_str(obj: &Value, key: &str) -> Result<String, ShapeError> {
    expect_key(obj, key, JsonKind::String, false)?
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(obj, key))
}

pub fn optional_str(obj: &Value, key: &str) -> Result<Option<String>, ShapeError> {
    Ok(expect_key(obj, key, JsonKind::String, true)?
        .and_then(Value::as_str)
        .map(str::to_string))
}

pub fn required_object<'a>(obj: &'a Value, key: &str) -> Result<&'a Map<String, Value>, ShapeError> {
    expect_key(obj, key, JsonKind::Object, false)?
        .and_then(Value::as_object)
        .ok_or_else(|| missing(obj, key))
}

/// Optional object whose values must all be strings
pub fn optional_string_map(
    obj: &Value,
    key: &str,
) -> Result<Option<IndexMap<String, String>>, ShapeError> {
    let Some(map) = expect_key(obj, key, JsonKind::Object, true)?.and_then(Value::as_object) else {
        return Ok(None);
    };

    let mut ret = IndexMap::with_capacity(map.len());
    for (name, value) in map {
        match value.as_str() {
            Some(s) => {
                ret.insert(name.clone(), s.to_string());
            }
            None => {
                return Err(ShapeError::NonStringValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }
    Ok(Some(ret))
}

fn missing(obj: &Value, key: &str) -> ShapeError {
    ShapeError::MissingKey {
        key: key.to_string(),
        object: obj.to_string(),
    }
}
