//! Lenient JSON field extraction for wire records.
//!
//! The remote omits, nulls, or re-types fields freely; these helpers coerce
//! with per-type defaults so one odd record never derails a run.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

/// A record that cannot be projected at all. Logged and counted by the
/// orchestrator; never propagated.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("id kind does not match the entity type")]
    IdKind,
}

pub fn str_or_empty(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn opt_i64(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_i64)
}

pub fn i64_or_zero(value: &Value, key: &str) -> i64 {
    opt_i64(value, key).unwrap_or(0)
}

pub fn bool_or_false(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn i32_or_zero(value: &Value, key: &str) -> i32 {
    opt_i64(value, key)
        .and_then(|n| i32::try_from(n).ok())
        .unwrap_or(0)
}

/// Unix-seconds field; zero and negative values count as absent.
pub fn epoch(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    let seconds = opt_i64(value, key)?;
    if seconds <= 0 {
        return None;
    }
    Utc.timestamp_opt(seconds, 0).single()
}

/// A `_embedded.<key>` sub-document, kept as its own JSON text.
pub fn embedded_raw(value: &Value, key: &str) -> Option<String> {
    value
        .get("_embedded")
        .and_then(|embedded| embedded.get(key))
        .filter(|v| !v.is_null())
        .map(Value::to_string)
}

/// A top-level sub-document, kept as its own JSON text.
pub fn field_raw(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .filter(|v| !v.is_null())
        .map(Value::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_and_null_fields_fall_back_to_defaults() {
        let value = json!({"name": null, "price": null});
        assert_eq!(str_or_empty(&value, "name"), "");
        assert_eq!(str_or_empty(&value, "absent"), "");
        assert_eq!(i64_or_zero(&value, "price"), 0);
        assert!(!bool_or_false(&value, "is_main"));
        assert_eq!(opt_i64(&value, "price"), None);
    }

    #[test]
    fn epoch_rejects_zero_and_negative_seconds() {
        let value = json!({"ok": 1_704_844_800, "zero": 0, "neg": -5});
        assert!(epoch(&value, "ok").is_some());
        assert!(epoch(&value, "zero").is_none());
        assert!(epoch(&value, "neg").is_none());
        assert!(epoch(&value, "absent").is_none());
    }

    #[test]
    fn embedded_raw_extracts_the_sub_document() {
        let value = json!({"_embedded": {"tags": [{"id": 1}], "leads": null}});
        assert_eq!(embedded_raw(&value, "tags"), Some("[{\"id\":1}]".to_string()));
        assert_eq!(embedded_raw(&value, "leads"), None);
        assert_eq!(embedded_raw(&value, "companies"), None);
    }
}
