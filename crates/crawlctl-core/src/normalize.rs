use crate::entry::{format_receipt_time, LogEntry, LEVEL_RAW};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde_json::{Map, Value};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Turns one stream frame into a log entry, stamping `now` as receipt time.
pub fn normalize(raw: &str) -> LogEntry {
    normalize_at(raw, Utc::now())
}

/// Total over every input: frames that are not a JSON object with a string
/// `message` become `RAW` entries holding the frame text verbatim.
pub fn normalize_at(raw: &str, received_at: DateTime<Utc>) -> LogEntry {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => from_record(fields, received_at)
            .unwrap_or_else(|| LogEntry::raw_at(raw, received_at)),
        _ => LogEntry::raw_at(raw, received_at),
    }
}

fn from_record(fields: Map<String, Value>, received_at: DateTime<Utc>) -> Option<LogEntry> {
    let (mut message, mut level, mut timestamp) = (None, None, None);
    // Walk in wire order so the remaining attributes keep the backend's order.
    let mut extra = Map::new();
    for (key, value) in fields {
        match key.as_str() {
            "message" => message = Some(value),
            "level" => level = Some(value),
            "timestamp" => timestamp = Some(value),
            _ => {
                extra.insert(key, value);
            }
        }
    }
    let message = match message {
        Some(Value::String(message)) => message,
        _ => return None,
    };
    let level = match level {
        Some(Value::String(level)) if !level.trim().is_empty() => level,
        _ => LEVEL_RAW.to_string(),
    };
    let timestamp = match timestamp {
        Some(Value::String(ts)) if parse_timestamp(&ts).is_some() => ts,
        _ => format_receipt_time(received_at),
    };
    let mut entry = LogEntry::new(timestamp, level, message);
    entry.extra = extra;
    Some(entry)
}

/// Parses an ISO-8601 timestamp into local wall-clock time.
///
/// Offset-qualified stamps are converted to the local zone; naive stamps (the
/// backend logger writes `datetime.isoformat()` without an offset) are taken as
/// already local.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Local).naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}
