use crate::entry::LogEntry;
use crate::normalize::normalize_at;
use chrono::{DateTime, Utc};
use std::fmt;
use url::Url;

pub const STREAM_PATH: &str = "logs";
pub const CONNECTED_MESSAGE: &str = "Connected to log stream...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "online",
            ConnectionState::Errored => "errored",
        }
    }

    pub fn can_open(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Errored
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derives the log stream endpoint from the HTTP base address. A secure base
/// yields `wss`, anything else `ws`; a path prefix on the base is kept.
pub fn stream_endpoint(base: &Url) -> Url {
    let mut endpoint = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) is always an allowed special-scheme swap.
    let _ = endpoint.set_scheme(scheme);
    let path = format!("{}/{STREAM_PATH}", base.path().trim_end_matches('/'));
    endpoint.set_path(&path);
    endpoint.set_query(None);
    endpoint.set_fragment(None);
    endpoint
}

/// Lifecycle of the single log stream connection.
///
/// Transport events drive the state; frames are only accepted while the
/// connection is live and teardown has not begun.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    state: ConnectionState,
    tearing_down: bool,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down
    }

    /// Returns `true` when the caller should dial a new connection.
    pub fn open(&mut self) -> bool {
        if self.tearing_down || !self.state.can_open() {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    pub fn on_open(&mut self, at: DateTime<Utc>) -> Option<LogEntry> {
        if self.tearing_down {
            return None;
        }
        self.state = ConnectionState::Connected;
        Some(LogEntry::system_at(CONNECTED_MESSAGE, at))
    }

    pub fn on_error(&mut self, endpoint: &Url, at: DateTime<Utc>) -> Option<LogEntry> {
        if self.tearing_down {
            return None;
        }
        self.state = ConnectionState::Errored;
        Some(LogEntry::error_at(
            format!("Connection failed to {endpoint}"),
            at,
        ))
    }

    pub fn on_close(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    pub fn on_frame(&self, raw: &str, at: DateTime<Utc>) -> Option<LogEntry> {
        if self.tearing_down || self.state != ConnectionState::Connected {
            return None;
        }
        Some(normalize_at(raw, at))
    }

    /// Marks the start of teardown. Returns `true` only on the first call so
    /// the close is issued once.
    pub fn begin_teardown(&mut self) -> bool {
        if self.tearing_down {
            return false;
        }
        self.tearing_down = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{LEVEL_ERROR, LEVEL_SYSTEM};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn endpoint_mirrors_base_scheme() {
        let plain = Url::parse("http://localhost:8000").unwrap();
        assert_eq!(stream_endpoint(&plain).as_str(), "ws://localhost:8000/logs");

        let secure = Url::parse("https://scraper.example.com/").unwrap();
        assert_eq!(
            stream_endpoint(&secure).as_str(),
            "wss://scraper.example.com/logs"
        );

        let prefixed = Url::parse("https://example.com/api/?x=1").unwrap();
        assert_eq!(
            stream_endpoint(&prefixed).as_str(),
            "wss://example.com/api/logs"
        );
    }

    #[test]
    fn open_connect_close_cycle() {
        let mut tracker = ConnectionTracker::new();
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        assert!(tracker.open());
        assert!(!tracker.open(), "already connecting");
        assert_eq!(tracker.state(), ConnectionState::Connecting);

        let entry = tracker.on_open(now()).unwrap();
        assert_eq!(entry.level, LEVEL_SYSTEM);
        assert_eq!(entry.message, CONNECTED_MESSAGE);
        assert_eq!(tracker.state(), ConnectionState::Connected);

        tracker.on_close();
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        assert!(tracker.on_frame("late", now()).is_none());
    }

    #[test]
    fn error_names_endpoint_and_allows_reopen() {
        let endpoint = Url::parse("ws://localhost:8000/logs").unwrap();
        let mut tracker = ConnectionTracker::new();
        tracker.open();
        let entry = tracker.on_error(&endpoint, now()).unwrap();
        assert_eq!(entry.level, LEVEL_ERROR);
        assert_eq!(entry.message, "Connection failed to ws://localhost:8000/logs");
        assert_eq!(tracker.state(), ConnectionState::Errored);
        assert!(tracker.open());
    }

    #[test]
    fn frames_after_teardown_are_discarded() {
        let mut tracker = ConnectionTracker::new();
        tracker.open();
        tracker.on_open(now());
        assert!(tracker.on_frame("first", now()).is_some());

        assert!(tracker.begin_teardown());
        assert!(!tracker.begin_teardown());
        assert!(tracker.on_frame("second", now()).is_none());
        assert!(tracker.on_open(now()).is_none());
        assert!(!tracker.open());
    }
}
