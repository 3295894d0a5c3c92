//! Parse-with-default helpers for untrusted model output.
//!
//! Every model response goes through [`extract_json`] and then a typed
//! decode. Field-level `deserialize_with` helpers give each field its own
//! fallback, so one malformed field never discards the whole object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Pull the first JSON document out of free text.
///
/// Accepts a bare document, a fenced ```json block, or the first balanced
/// `{...}` / `[...]` span embedded in prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    if let Some(fenced) = fenced_block(trimmed)
        && let Ok(v) = serde_json::from_str::<Value>(fenced.trim())
    {
        return Some(v);
    }

    let bytes = trimmed.as_bytes();
    let mut from = 0;
    // Bounded: each failed candidate advances past its opening bracket.
    while let Some(offset) = memchr::memchr2(b'{', b'[', &bytes[from..]) {
        let start = from + offset;
        if let Some(end) = balanced_end(&trimmed[start..])
            && let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..start + end])
        {
            return Some(v);
        }
        from = start + 1;
    }
    None
}

/// Decode text into `T`, or return `fallback()` when nothing usable is found.
pub fn parse_or_else<T: DeserializeOwned>(text: &str, fallback: impl FnOnce() -> T) -> T {
    extract_json(text)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_else(fallback)
}

/// Body of the first ``` fence, skipping the language tag line.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Byte length of the balanced JSON value starting at `s[0]`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in s.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Field-level deserializers
// ---------------------------------------------------------------------------

/// Field decodes as `T`, or `T::default()` when the value is malformed.
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Field decodes as `Some(T)`, or `None` when null or malformed.
pub fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Array field keeping only the elements that decode.
pub fn vec_skip_invalid<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Complexity score: any number rounded into `1..=10`, otherwise 5.
pub fn complexity<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let n = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(match n {
        Some(n) if n.is_finite() => n.round().clamp(1.0, 10.0) as u8,
        _ => 5,
    })
}
