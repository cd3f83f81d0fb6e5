//! Argument extraction shared by the executors.
//!
//! Small local models are sloppy with types, so numeric arguments are also
//! accepted as numeric strings (`"limit": "20"`).

use serde_json::{Map, Value};
use twin_core::error::ToolError;

pub fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

pub fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// The first of `keys` that is present as a string.
pub fn str_alias<'a>(args: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| args.get(*k).and_then(Value::as_str))
}

pub fn optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| invalid_number(key, &n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid_number(key, s)),
        Some(other) => Err(invalid_number(key, &other.to_string())),
    }
}

fn invalid_number(key: &str, got: &str) -> ToolError {
    ToolError::InvalidArguments(format!("'{key}' must be a non-negative integer, got {got}"))
}
