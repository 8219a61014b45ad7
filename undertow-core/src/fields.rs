//! Tolerant field access for raw API payloads.
//!
//! External APIs drift: fields go missing, change type, or arrive null. These
//! helpers turn any such field-level problem into a `None` with a debug log,
//! so a single malformed field never discards an otherwise-valid record.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

pub fn opt_str(item: &Value, key: &str) -> Option<String> {
    match item.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => {
            debug!("field {} has unexpected type: {}", key, type_name(other));
            None
        }
    }
}

pub fn opt_i64(item: &Value, key: &str) -> Option<i64> {
    match item.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::Null) | None => None,
        Some(other) => {
            debug!("field {} has unexpected type: {}", key, type_name(other));
            None
        }
    }
}

pub fn opt_f64(item: &Value, key: &str) -> Option<f64> {
    match item.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Null) | None => None,
        Some(other) => {
            debug!("field {} has unexpected type: {}", key, type_name(other));
            None
        }
    }
}

pub fn opt_bool(item: &Value, key: &str) -> Option<bool> {
    match item.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Null) | None => None,
        Some(other) => {
            debug!("field {} has unexpected type: {}", key, type_name(other));
            None
        }
    }
}

/// Unix epoch seconds (Reddit reports them as floats) to a UTC timestamp.
pub fn opt_epoch(item: &Value, key: &str) -> Option<DateTime<Utc>> {
    let secs = opt_f64(item, key)?;
    match Utc.timestamp_opt(secs as i64, 0) {
        chrono::LocalResult::Single(dt) => Some(dt),
        _ => {
            debug!("field {} is out of timestamp range: {}", key, secs);
            None
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_null_fields_are_none() {
        let item = json!({ "title": null });
        assert_eq!(opt_str(&item, "title"), None);
        assert_eq!(opt_str(&item, "absent"), None);
        assert_eq!(opt_i64(&item, "absent"), None);
        assert_eq!(opt_bool(&item, "absent"), None);
    }

    #[test]
    fn test_type_mismatch_is_none_not_error() {
        let item = json!({ "score": "not a number", "stickied": 3, "title": 12 });
        assert_eq!(opt_i64(&item, "score"), None);
        assert_eq!(opt_bool(&item, "stickied"), None);
        assert_eq!(opt_str(&item, "title"), None);
    }

    #[test]
    fn test_well_formed_fields_extract() {
        let item = json!({
            "title": "hello",
            "score": 42,
            "upvote_ratio": 0.93,
            "stickied": false
        });
        assert_eq!(opt_str(&item, "title"), Some("hello".to_string()));
        assert_eq!(opt_i64(&item, "score"), Some(42));
        assert_eq!(opt_f64(&item, "upvote_ratio"), Some(0.93));
        assert_eq!(opt_bool(&item, "stickied"), Some(false));
    }

    #[test]
    fn test_epoch_conversion() {
        let item = json!({ "created_utc": 1640995200.0 });
        let dt = opt_epoch(&item, "created_utc").unwrap();
        assert_eq!(dt.to_rfc3339(), "2022-01-01T00:00:00+00:00");

        let bad = json!({ "created_utc": "tomorrow" });
        assert_eq!(opt_epoch(&bad, "created_utc"), None);
    }
}
