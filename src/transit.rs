// 🧬 Nested-Array State Decoder
//
// Some pages ship their client state as a string literal assigned inside a
// <script> tag. The string holds a JSON array document written with reader
// macros:
//
//   value      := array | string | number | bool | null
//   orderedMap := ["~#iM", [k1, v1, k2, v2, ...]]
//   tagged     := ["~#<tag>", payload]           (payload decoded as-is)
//   backref    := "^<index>" | ["^", index]      (key position only)
//
// A back-reference names the key at position <index> among the keys already
// established in the innermost open map. Resolution never looks at outer or
// sibling maps, so the decoder keeps an explicit stack of open maps.
//
// String escapes: "~~x" → "~x", "~^x" → "^x", "~:kw" → "kw".
//
// Output is a plain serde_json::Value tree (maps become objects).

use crate::error::AdapterError;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

pub const MAP_TAG: &str = "~#iM";

#[derive(Debug, Error, PartialEq)]
pub enum TransitError {
    #[error("state assignment '{0}' not found in page")]
    StateNotFound(String),

    #[error("state string literal is not terminated")]
    UnterminatedLiteral,

    #[error("state string literal is not decodable: {0}")]
    InvalidLiteral(String),

    #[error("ordered map is malformed: {0}")]
    MalformedMap(String),

    #[error("back-reference ^{index} has no key (current map has {open_keys} keys)")]
    DanglingBackref { index: usize, open_keys: usize },

    #[error("back-reference used outside of any ordered map")]
    BackrefOutsideMap,

    #[error("value cannot be used as a map key: {0}")]
    InvalidKey(String),
}

impl From<TransitError> for AdapterError {
    fn from(err: TransitError) -> Self {
        AdapterError::malformed("nested-array state", err.to_string())
    }
}

// ============================================================================
// LOCATING THE ASSIGNMENT
// ============================================================================

/// Isolate the string literal assigned to `variable` (quotes included).
///
/// Matches `variable = "..."` and `window.variable = '...'`.
pub fn extract_state_literal(html: &str, variable: &str) -> Result<String, TransitError> {
    let pattern = format!(r#"(?:window\.)?{}\s*=\s*(["'])"#, regex::escape(variable));
    let re = Regex::new(&pattern).map_err(|e| TransitError::InvalidLiteral(e.to_string()))?;

    let caps = re
        .captures(html)
        .ok_or_else(|| TransitError::StateNotFound(variable.to_string()))?;
    let quote_match = caps.get(1).ok_or(TransitError::UnterminatedLiteral)?;
    let quote = html[quote_match.start()..quote_match.end()]
        .chars()
        .next()
        .ok_or(TransitError::UnterminatedLiteral)?;

    let start = quote_match.start();
    let mut escaped = false;
    for (offset, ch) in html[quote_match.end()..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            c if c == quote => {
                let end = quote_match.end() + offset + ch.len_utf8();
                return Ok(html[start..end].to_string());
            }
            _ => {}
        }
    }

    Err(TransitError::UnterminatedLiteral)
}

/// Decode a quoted JS string literal into its string contents.
///
/// The body is rewritten into a JSON string literal first: `\'` and `\xNN`
/// become JSON-legal, bare `"` inside single quotes gets escaped.
pub fn decode_literal(literal: &str) -> Result<String, TransitError> {
    let mut chars = literal.chars();
    let quote = chars.next().ok_or(TransitError::UnterminatedLiteral)?;
    if literal.len() < 2 || !literal.ends_with(quote) || (quote != '"' && quote != '\'') {
        return Err(TransitError::UnterminatedLiteral);
    }
    let body = &literal[1..literal.len() - 1];

    let mut json = String::with_capacity(body.len() + 2);
    json.push('"');
    let mut iter = body.chars().peekable();
    while let Some(ch) = iter.next() {
        match ch {
            '\\' => match iter.next() {
                Some('\'') => json.push('\''),
                Some('x') => {
                    let hex: String = iter.by_ref().take(2).collect();
                    json.push_str("\\u00");
                    json.push_str(&hex);
                }
                Some(other) => {
                    json.push('\\');
                    json.push(other);
                }
                None => return Err(TransitError::UnterminatedLiteral),
            },
            '"' => json.push_str("\\\""),
            c => json.push(c),
        }
    }
    json.push('"');

    serde_json::from_str::<String>(&json).map_err(|e| TransitError::InvalidLiteral(e.to_string()))
}

// ============================================================================
// RECURSIVE DESCENT
// ============================================================================

struct Decoder {
    /// Keys established so far in each open ordered map, innermost last
    open_maps: Vec<Vec<String>>,
}

impl Decoder {
    fn value(&mut self, value: &Value) -> Result<Value, TransitError> {
        match value {
            Value::Array(items) => self.array(items),
            Value::String(s) => Ok(Value::String(unescape(s))),
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.value(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn array(&mut self, items: &[Value]) -> Result<Value, TransitError> {
        if let Some(Value::String(tag)) = items.first() {
            if tag == MAP_TAG {
                let entries = match items {
                    [_, Value::Array(entries)] => entries,
                    _ => {
                        return Err(TransitError::MalformedMap(
                            "expected [\"~#iM\", [k, v, ...]]".to_string(),
                        ))
                    }
                };
                return self.ordered_map(entries);
            }
            if tag.starts_with("~#") {
                return match items {
                    [_, payload] => self.value(payload),
                    _ => Err(TransitError::MalformedMap(format!(
                        "tag {} expects exactly one payload",
                        tag
                    ))),
                };
            }
        }

        items
            .iter()
            .map(|item| self.value(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn ordered_map(&mut self, entries: &[Value]) -> Result<Value, TransitError> {
        if entries.len() % 2 != 0 {
            return Err(TransitError::MalformedMap(format!(
                "odd number of entries ({})",
                entries.len()
            )));
        }

        self.open_maps.push(Vec::new());
        let result = self.map_entries(entries);
        self.open_maps.pop();
        result
    }

    fn map_entries(&mut self, entries: &[Value]) -> Result<Value, TransitError> {
        let mut out = Map::new();
        for pair in entries.chunks(2) {
            let key = self.key(&pair[0])?;
            let value = self.value(&pair[1])?;
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }

    fn key(&mut self, raw: &Value) -> Result<String, TransitError> {
        if let Some(index) = backref_index(raw) {
            let keys = self.open_maps.last().ok_or(TransitError::BackrefOutsideMap)?;
            return keys
                .get(index)
                .cloned()
                .ok_or(TransitError::DanglingBackref {
                    index,
                    open_keys: keys.len(),
                });
        }

        let key = match raw {
            Value::String(s) => unescape(s),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => return Err(TransitError::InvalidKey(other.to_string())),
        };

        let keys = self.open_maps.last_mut().ok_or(TransitError::BackrefOutsideMap)?;
        if !keys.contains(&key) {
            keys.push(key.clone());
        }
        Ok(key)
    }
}

fn backref_index(raw: &Value) -> Option<usize> {
    match raw {
        Value::String(s) => {
            let digits = s.strip_prefix('^')?;
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            digits.parse().ok()
        }
        Value::Array(items) => match items.as_slice() {
            [Value::String(caret), Value::Number(n)] if caret == "^" => {
                n.as_u64().map(|n| n as usize)
            }
            _ => None,
        },
        _ => None,
    }
}

fn unescape(s: &str) -> String {
    if let Some(rest) = s.strip_prefix("~~") {
        format!("~{}", rest)
    } else if let Some(rest) = s.strip_prefix("~^") {
        format!("^{}", rest)
    } else if let Some(rest) = s.strip_prefix("~:") {
        rest.to_string()
    } else {
        s.to_string()
    }
}

// ============================================================================
// PUBLIC ENTRY POINTS
// ============================================================================

/// Decode an already-parsed nested-array document.
pub fn decode(document: &Value) -> Result<Value, TransitError> {
    Decoder {
        open_maps: Vec::new(),
    }
    .value(document)
}

/// Decode the array document held in a string (the literal's contents).
pub fn decode_str(document: &str) -> Result<Value, TransitError> {
    let raw: Value =
        serde_json::from_str(document).map_err(|e| TransitError::InvalidLiteral(e.to_string()))?;
    decode(&raw)
}

/// Page markup → plain nested mapping.
pub fn parse_page_state(html: &str, variable: &str) -> Result<Value, TransitError> {
    let literal = extract_state_literal(html, variable)?;
    let document = decode_literal(&literal)?;
    decode_str(&document)
}
