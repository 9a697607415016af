use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const LEVEL_SYSTEM: &str = "SYSTEM";
pub const LEVEL_INFO: &str = "INFO";
pub const LEVEL_WARNING: &str = "WARNING";
pub const LEVEL_ERROR: &str = "ERROR";
pub const LEVEL_RAW: &str = "RAW";

/// One line of the live execution log.
///
/// `level` stays a free-form string: the backend may emit levels this console
/// does not know about (`DEBUG`, `CRITICAL`, ...) and they are displayed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    /// Remaining backend attributes, in the order they were sent.
    #[serde(default, flatten, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl LogEntry {
    pub fn new(
        timestamp: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            level: level.into(),
            message: message.into(),
            extra: Map::new(),
        }
    }

    pub fn system_at(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(format_receipt_time(at), LEVEL_SYSTEM, message)
    }

    pub fn error_at(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(format_receipt_time(at), LEVEL_ERROR, message)
    }

    pub fn raw_at(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(format_receipt_time(at), LEVEL_RAW, message)
    }

    pub fn severity(&self) -> Severity {
        Severity::from_level(&self.level)
    }
}

/// Display class of a level string. Anything that is not one of the three
/// recognised backend levels falls into `Neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Neutral,
}

impl Severity {
    pub fn from_level(level: &str) -> Self {
        match level {
            LEVEL_ERROR => Severity::Error,
            LEVEL_WARNING => Severity::Warning,
            LEVEL_INFO => Severity::Info,
            _ => Severity::Neutral,
        }
    }
}

/// Receipt times are written the same way a browser's `toISOString` would.
pub fn format_receipt_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
