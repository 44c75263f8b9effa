use chrono::DateTime;
use serde_json::Value;

/// Magnitude at which a raw epoch value is taken to be milliseconds
const MILLIS_THRESHOLD: f64 = 1e12;

/// Epoch seconds from a raw numeric value that may be seconds or milliseconds.
pub fn normalize_timestamp(raw: f64) -> f64 {
    if raw.abs() >= MILLIS_THRESHOLD {
        raw / 1000.0
    } else {
        raw
    }
}

/// Extract an orderable timestamp (epoch seconds) from a message payload.
///
/// Accepted shapes:
/// - bare number: `1730399405` or `1730399405123`
/// - bare ISO-8601: `2024-10-31T18:30:05.123Z`
/// - JSON object with a `timestamp` field holding either of the above
pub fn parse_timestamp(payload: &str) -> Option<f64> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    if let Some(ts) = parse_scalar(payload) {
        return Some(ts);
    }

    match serde_json::from_str::<Value>(payload).ok()? {
        Value::Object(fields) => match fields.get("timestamp")? {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(normalize_timestamp),
            Value::String(s) => parse_scalar(s.trim()),
            _ => None,
        },
        Value::String(s) => parse_scalar(s.trim()),
        _ => None,
    }
}

fn parse_scalar(text: &str) -> Option<f64> {
    if let Ok(n) = text.parse::<f64>() {
        return n.is_finite().then(|| normalize_timestamp(n));
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
}
