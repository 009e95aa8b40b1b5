// Field lookup helpers for loosely-shaped bank JSON.
//
// Banks spell the same logical field differently across products
// (account_token / accountToken), and sometimes send ids as numbers.

use crate::error::{AdapterError, AdapterResult};
use serde_json::Value;

/// First present spelling, as a string. Numbers are stringified; empty strings count as absent.
pub fn str_field(value: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match value.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Like `str_field`, but a missing field is an upstream error naming the first spelling.
pub fn require_str(value: &Value, names: &[&str], context: &str) -> AdapterResult<String> {
    str_field(value, names).ok_or_else(|| {
        AdapterError::missing_field(context, names.first().copied().unwrap_or("<unnamed>"))
    })
}

pub fn i64_field(value: &Value, names: &[&str]) -> Option<i64> {
    names.iter().find_map(|name| match value.get(*name)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Follow a path of object keys ("data", "accounts").
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |current, key| current.get(*key))
}

/// Array at `keys`, or an upstream error naming the dotted path.
pub fn require_array<'a>(
    value: &'a Value,
    keys: &[&str],
    context: &str,
) -> AdapterResult<&'a Vec<Value>> {
    path(value, keys)
        .and_then(|v| v.as_array())
        .ok_or_else(|| AdapterError::missing_field(context, &keys.join(".")))
}
