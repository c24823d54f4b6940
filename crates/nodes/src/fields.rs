//! Small helpers for reading node config and context values.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::NodeError;

/// Resolve a dotted path (`submittedData.email`) against a JSON object.
pub fn lookup<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = map.get(parts.next()?)?;
    parts.try_fold(first, |current, key| match current {
        Value::Object(obj) => obj.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// A non-empty string value, if present.
pub fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A required non-empty string from node config.
pub fn required_str<'a>(config: &'a Map<String, Value>, key: &str) -> Result<&'a str, NodeError> {
    match config.get(key) {
        None | Some(Value::Null) => Err(NodeError::config(format!("'{key}' is required"))),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(_) => Err(NodeError::config(format!("'{key}' must be a non-empty string"))),
    }
}

/// An optional number from node config; numeric strings are accepted.
pub fn optional_f64(config: &Map<String, Value>, key: &str) -> Result<Option<f64>, NodeError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| NodeError::config(format!("'{key}' must be a number, got '{s}'"))),
        Some(other) => Err(NodeError::config(format!("'{key}' must be a number, got {other}"))),
    }
}

/// Pick the first non-empty string: node config first, then the run context.
pub fn config_or_context(
    config: &Map<String, Value>,
    input: &Map<String, Value>,
    key: &str,
) -> Option<String> {
    str_field(config, key)
        .or_else(|| str_field(input, key))
        .map(str::to_owned)
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A short, prefixed entity identifier (`contact_3f2a…`).
pub fn entity_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn lookup_walks_nested_objects_and_arrays() {
        let map = obj(json!({ "a": { "b": [10, { "c": "deep" }] } }));
        assert_eq!(lookup(&map, "a.b.0"), Some(&json!(10)));
        assert_eq!(lookup(&map, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(lookup(&map, "a.missing"), None);
    }

    #[test]
    fn required_str_rejects_blank_and_non_strings() {
        let cfg = obj(json!({ "blank": "  ", "num": 3, "ok": "x" }));
        assert!(required_str(&cfg, "blank").is_err());
        assert!(required_str(&cfg, "num").is_err());
        assert!(required_str(&cfg, "absent").is_err());
        assert_eq!(required_str(&cfg, "ok").unwrap(), "x");
    }

    #[test]
    fn optional_f64_accepts_numeric_strings() {
        let cfg = obj(json!({ "a": 2.5, "b": "7", "c": "seven" }));
        assert_eq!(optional_f64(&cfg, "a").unwrap(), Some(2.5));
        assert_eq!(optional_f64(&cfg, "b").unwrap(), Some(7.0));
        assert_eq!(optional_f64(&cfg, "none").unwrap(), None);
        assert!(optional_f64(&cfg, "c").is_err());
    }

    #[test]
    fn config_wins_over_context() {
        let cfg = obj(json!({ "email": "cfg@example.com" }));
        let ctx = obj(json!({ "email": "ctx@example.com", "name": "Ada" }));
        assert_eq!(config_or_context(&cfg, &ctx, "email").as_deref(), Some("cfg@example.com"));
        assert_eq!(config_or_context(&cfg, &ctx, "name").as_deref(), Some("Ada"));
        assert_eq!(config_or_context(&cfg, &ctx, "phone"), None);
    }
}
