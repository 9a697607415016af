use crate::clipboard::Clipboard;
use crate::config::Config;
use chrono::{DateTime, Utc};
use crawlctl_core::client::MessageResponse;
use crawlctl_core::run::{MAX_DEPTH, MIN_DEPTH};
use crawlctl_core::{
    parse_artifact, BackendError, ConnectionTracker, LogBuffer, NodePath, RunCoordinator,
    RunEpoch, StartRequest, StatusResponse, TreeExplorer, ARTIFACT_ROOT_KEY,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

pub const COMMAND_QUEUE_CAPACITY: usize = 64;
pub const COPY_ACK_DURATION: Duration = Duration::from_millis(1500);
const LOG_PAGE_ROWS: usize = 10;
const EXPLORER_PAGE_ROWS: isize = 10;

/// Work the event loop runs on behalf of `App`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenStream,
    Start(StartRequest),
    Stop,
    Probe(RunEpoch),
    FetchArtifact,
    SaveArtifact,
}

/// Results reported back by stream and request tasks.
#[derive(Debug)]
pub enum AppEvent {
    StreamOpened,
    StreamFrame {
        text: String,
        received_at: DateTime<Utc>,
    },
    StreamErrored {
        reason: String,
    },
    StreamClosed,
    StartFinished {
        epoch: RunEpoch,
        result: Result<MessageResponse, BackendError>,
    },
    StopFinished {
        result: Result<MessageResponse, BackendError>,
    },
    Status {
        epoch: RunEpoch,
        result: Result<StatusResponse, BackendError>,
    },
    ArtifactFetched {
        result: Result<String, BackendError>,
    },
    ArtifactSaved {
        result: anyhow::Result<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetForm {
    pub url: String,
    pub max_depth: u8,
    pub editing: bool,
}

impl TargetForm {
    fn adjust_depth(&mut self, delta: i16) {
        let next = i16::from(self.max_depth) + delta;
        self.max_depth = next.clamp(i16::from(MIN_DEPTH), i16::from(MAX_DEPTH)) as u8;
    }
}

#[derive(Debug, Clone)]
pub struct CopyAck {
    pub path: NodePath,
    pub at: Instant,
}

pub struct App {
    pub api_base: Url,
    pub stream_url: Url,
    pub log_path: Option<PathBuf>,
    command_tx: mpsc::Sender<Command>,
    clipboard: Box<dyn Clipboard>,
    pub buffer: LogBuffer,
    pub connection: ConnectionTracker,
    pub run: RunCoordinator,
    pub form: TargetForm,
    pub explorer: Option<TreeExplorer>,
    pub loading_artifact: bool,
    pub saving_artifact: bool,
    pub copy_ack: Option<CopyAck>,
    pub status_note: Option<String>,
    pub help_open: bool,
}

impl App {
    pub fn new(
        config: &Config,
        command_tx: mpsc::Sender<Command>,
        clipboard: Box<dyn Clipboard>,
    ) -> Self {
        Self {
            api_base: config.api_base.clone(),
            stream_url: config.stream_url.clone(),
            log_path: None,
            command_tx,
            clipboard,
            buffer: LogBuffer::new(),
            connection: ConnectionTracker::new(),
            run: RunCoordinator::new(),
            form: TargetForm {
                url: config.target_url.clone(),
                max_depth: config.max_depth,
                editing: false,
            },
            explorer: None,
            loading_artifact: false,
            saving_artifact: false,
            copy_ack: None,
            status_note: None,
            help_open: false,
        }
    }

    pub fn can_start(&self) -> bool {
        !self.form.url.trim().is_empty() && !self.run.is_running()
    }

    pub fn can_stop(&self) -> bool {
        self.run.is_running()
    }

    pub fn can_save(&self) -> bool {
        !self.buffer.is_empty() && !self.saving_artifact
    }

    pub fn can_view(&self) -> bool {
        !self.buffer.is_empty() && !self.loading_artifact
    }

    pub fn open_stream(&mut self) {
        if !self.connection.open() {
            self.status_note = Some(format!("log stream is {}", self.connection.state()));
            return;
        }
        if !self.queue_command(Command::OpenStream) {
            // Nothing will ever answer the dial; fall back so `c` can retry.
            self.connection.on_close();
        }
    }

    pub fn start_run(&mut self) {
        if self.form.url.trim().is_empty() {
            self.status_note = Some("enter a target URL first".to_string());
            return;
        }
        let Some(request) = self.run.start(&self.form.url, self.form.max_depth) else {
            self.status_note = Some("a crawl is already active".to_string());
            return;
        };
        let epoch = request.epoch;
        info!(
            event = "run_start_requested",
            url = %request.url,
            max_depth = request.max_depth,
            epoch = epoch.0
        );
        if self.queue_command(Command::Start(request)) {
            self.status_note = Some("start requested".to_string());
        } else {
            self.run.on_start_failed(epoch);
        }
    }

    pub fn stop_run(&mut self) {
        if !self.run.stop() {
            self.status_note = Some("no active crawl to stop".to_string());
            return;
        }
        info!(event = "run_stop_requested");
        if self.queue_command(Command::Stop) {
            self.status_note = Some("stop requested".to_string());
        }
    }

    /// Called by the probe schedule. Only the current run is probed.
    pub fn queue_probe(&mut self) {
        if !self.run.should_probe() {
            return;
        }
        let epoch = self.run.epoch();
        self.queue_command(Command::Probe(epoch));
    }

    pub fn view_artifact(&mut self) {
        if self.buffer.is_empty() {
            self.status_note = Some("no logs yet; nothing to view".to_string());
            return;
        }
        if self.loading_artifact {
            self.status_note = Some("artifact is already loading".to_string());
            return;
        }
        if self.queue_command(Command::FetchArtifact) {
            self.loading_artifact = true;
            self.status_note = Some("loading artifact...".to_string());
        }
    }

    pub fn save_artifact(&mut self) {
        if self.buffer.is_empty() {
            self.status_note = Some("no logs yet; nothing to save".to_string());
            return;
        }
        if self.saving_artifact {
            self.status_note = Some("artifact save already in progress".to_string());
            return;
        }
        if self.queue_command(Command::SaveArtifact) {
            self.saving_artifact = true;
            self.status_note = Some("saving artifact...".to_string());
        }
    }

    /// Marks the start of teardown. Returns `true` the first time only.
    pub fn begin_teardown(&mut self) -> bool {
        self.connection.begin_teardown()
    }

    pub fn apply_event(&mut self, event: AppEvent) {
        self.apply_event_at(event, Utc::now());
    }

    pub fn apply_event_at(&mut self, event: AppEvent, now: DateTime<Utc>) {
        if self.connection.is_tearing_down() {
            debug!(event = "late_event_dropped", kind = event_kind(&event));
            return;
        }
        match event {
            AppEvent::StreamOpened => {
                info!(event = "stream_connected", endpoint = %self.stream_url);
                if let Some(entry) = self.connection.on_open(now) {
                    self.buffer.push(entry);
                }
            }
            AppEvent::StreamFrame { text, received_at } => {
                if let Some(entry) = self.connection.on_frame(&text, received_at) {
                    self.buffer.push(entry);
                }
            }
            AppEvent::StreamErrored { reason } => {
                warn!(
                    event = "stream_error",
                    endpoint = %self.stream_url,
                    reason = %reason
                );
                if let Some(entry) = self.connection.on_error(&self.stream_url, now) {
                    self.buffer.push(entry);
                }
                self.status_note = Some("log stream failed; press c to reconnect".to_string());
            }
            AppEvent::StreamClosed => {
                info!(event = "stream_closed", endpoint = %self.stream_url);
                self.connection.on_close();
                self.status_note = Some("log stream closed; press c to reconnect".to_string());
            }
            AppEvent::StartFinished { epoch, result } => match result {
                Ok(reply) => {
                    info!(event = "run_start_accepted", epoch = epoch.0);
                    if epoch == self.run.epoch() && self.run.is_running() {
                        self.status_note =
                            Some(reply.message.unwrap_or_else(|| "crawl started".to_string()));
                    }
                }
                Err(err) => {
                    warn!(event = "run_start_failed", epoch = epoch.0, error = %err);
                    if self.run.on_start_failed(epoch) {
                        self.status_note = Some("start failed; see developer log".to_string());
                    }
                }
            },
            AppEvent::StopFinished { result } => match result {
                Ok(_) => info!(event = "run_stop_sent"),
                Err(err) => {
                    warn!(event = "run_stop_failed", error = %err);
                    self.status_note = Some("stop request failed; see developer log".to_string());
                }
            },
            AppEvent::Status { epoch, result } => match result {
                Ok(status) => {
                    debug!(
                        event = "status_probe",
                        epoch = epoch.0,
                        is_running = status.is_running
                    );
                    if let Some(entry) = self.run.on_status(epoch, status.is_running, now) {
                        info!(event = "run_completed", epoch = epoch.0);
                        self.buffer.push(entry);
                        self.status_note = Some("crawl finished".to_string());
                    }
                }
                Err(err) => {
                    warn!(event = "status_probe_failed", epoch = epoch.0, error = %err);
                }
            },
            AppEvent::ArtifactFetched { result } => {
                self.loading_artifact = false;
                match result {
                    Ok(text) => {
                        let parsed = parse_artifact(&text);
                        info!(
                            event = "artifact_loaded",
                            records = parsed.len(),
                            malformed = parsed.malformed_lines
                        );
                        self.status_note = Some(format!("loaded {} records", parsed.len()));
                        self.copy_ack = None;
                        self.explorer =
                            Some(TreeExplorer::new(ARTIFACT_ROOT_KEY, parsed.into_document()));
                    }
                    Err(err) => {
                        warn!(event = "artifact_fetch_failed", error = %err);
                        self.status_note = Some("could not load artifact".to_string());
                    }
                }
            }
            AppEvent::ArtifactSaved { result } => {
                self.saving_artifact = false;
                match result {
                    Ok(path) => {
                        info!(event = "artifact_saved", path = %path.display());
                        self.status_note = Some(format!("saved {}", path.display()));
                    }
                    Err(err) => {
                        warn!(event = "artifact_save_failed", error = %format!("{err:#}"));
                        self.status_note = Some("artifact save failed".to_string());
                    }
                }
            }
        }
    }

    /// Expires the copy acknowledgment.
    pub fn on_tick(&mut self, now: Instant) {
        if let Some(ack) = &self.copy_ack {
            if now.saturating_duration_since(ack.at) >= COPY_ACK_DURATION {
                self.copy_ack = None;
            }
        }
    }

    pub fn is_copy_acknowledged(&self, path: &NodePath) -> bool {
        self.copy_ack.as_ref().is_some_and(|ack| &ack.path == path)
    }

    pub fn copy_selected(&mut self, now: Instant) {
        let Some(explorer) = &self.explorer else {
            return;
        };
        let Some(row) = explorer.selected_row() else {
            return;
        };
        let Some(text) = explorer.selected_copy_text() else {
            self.status_note = Some("select a value to copy".to_string());
            return;
        };
        let path = row.path.clone();
        match self.clipboard.copy(&text) {
            Ok(()) => {
                debug!(event = "value_copied", path = %path, bytes = text.len());
                self.copy_ack = Some(CopyAck { path, at: now });
            }
            Err(err) => {
                warn!(event = "clipboard_write_failed", path = %path, error = %err);
                self.status_note = Some("copy failed".to_string());
            }
        }
    }

    pub fn close_explorer(&mut self) {
        self.explorer = None;
        self.copy_ack = None;
    }

    /// Returns `true` when the console should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        if self.help_open {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::F(1)) {
                self.help_open = false;
            }
            return false;
        }
        if self.explorer.is_some() {
            self.handle_explorer_key(key);
            return false;
        }
        if self.form.editing {
            self.handle_edit_key(key);
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('?') | KeyCode::F(1) => self.help_open = true,
            KeyCode::Char('i') | KeyCode::Char('e') => {
                self.form.editing = true;
                self.status_note = Some("editing target URL".to_string());
            }
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Right => self.form.adjust_depth(1),
            KeyCode::Char('-') | KeyCode::Left => self.form.adjust_depth(-1),
            KeyCode::Enter => self.start_run(),
            KeyCode::Char('x') => self.stop_run(),
            KeyCode::Char('d') => self.save_artifact(),
            KeyCode::Char('v') => self.view_artifact(),
            KeyCode::Char('c') => self.open_stream(),
            KeyCode::PageUp | KeyCode::Up | KeyCode::Char('k') => {
                self.buffer.scroll_up(scroll_step(key.code))
            }
            KeyCode::PageDown | KeyCode::Down | KeyCode::Char('j') => {
                self.buffer.scroll_down(scroll_step(key.code))
            }
            KeyCode::Home => self.buffer.scroll_to_top(),
            KeyCode::End => self.buffer.follow(),
            _ => {}
        }
        false
    }

    fn handle_edit_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => {
                self.form.editing = false;
                self.form.url = self.form.url.trim().to_string();
                self.status_note = None;
            }
            KeyCode::Backspace => {
                self.form.url.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.form.url.clear();
            }
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.form.url.push(ch);
            }
            _ => {}
        }
    }

    fn handle_explorer_key(&mut self, key: KeyEvent) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
            self.close_explorer();
            return;
        }
        if key.code == KeyCode::Char('y') {
            self.copy_selected(Instant::now());
            return;
        }
        let Some(explorer) = self.explorer.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => explorer.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => explorer.move_selection(-1),
            KeyCode::PageDown => explorer.move_selection(EXPLORER_PAGE_ROWS),
            KeyCode::PageUp => explorer.move_selection(-EXPLORER_PAGE_ROWS),
            KeyCode::Char('g') | KeyCode::Home => explorer.select_first(),
            KeyCode::Char('G') | KeyCode::End => explorer.select_last(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                explorer.toggle_selected();
            }
            KeyCode::Right | KeyCode::Char('l') => {
                explorer.expand_selected();
            }
            KeyCode::Left | KeyCode::Char('h') => {
                explorer.collapse_selected();
            }
            _ => {}
        }
    }

    /// Hands a command to the event loop. Returns `false` if it was dropped.
    fn queue_command(&mut self, command: Command) -> bool {
        match self.command_tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(command)) => {
                warn!(
                    event = "command_queue_drop",
                    reason = "queue_full",
                    command = command_name(&command),
                    capacity = COMMAND_QUEUE_CAPACITY
                );
                self.status_note = Some("command queue full; try again".to_string());
                false
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                warn!(
                    event = "command_queue_drop",
                    reason = "queue_closed",
                    command = command_name(&command)
                );
                self.status_note = Some("console is shutting down".to_string());
                false
            }
        }
    }
}

fn scroll_step(code: KeyCode) -> usize {
    match code {
        KeyCode::PageUp | KeyCode::PageDown => LOG_PAGE_ROWS,
        _ => 1,
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::OpenStream => "open_stream",
        Command::Start(_) => "start",
        Command::Stop => "stop",
        Command::Probe(_) => "probe",
        Command::FetchArtifact => "fetch_artifact",
        Command::SaveArtifact => "save_artifact",
    }
}

fn event_kind(event: &AppEvent) -> &'static str {
    match event {
        AppEvent::StreamOpened => "stream_opened",
        AppEvent::StreamFrame { .. } => "stream_frame",
        AppEvent::StreamErrored { .. } => "stream_errored",
        AppEvent::StreamClosed => "stream_closed",
        AppEvent::StartFinished { .. } => "start_finished",
        AppEvent::StopFinished { .. } => "stop_finished",
        AppEvent::Status { .. } => "status",
        AppEvent::ArtifactFetched { .. } => "artifact_fetched",
        AppEvent::ArtifactSaved { .. } => "artifact_saved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::testing::RecordingClipboard;
    use crate::config::testing::config as test_config;
    use chrono::TimeZone;
    use crawlctl_core::connection::CONNECTED_MESSAGE;
    use crawlctl_core::entry::{LEVEL_ERROR, LEVEL_SYSTEM};
    use crawlctl_core::run::COMPLETED_MESSAGE;
    use crawlctl_core::{ConnectionState, RunState};

    fn app_with(clipboard: RecordingClipboard) -> (App, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(8);
        (App::new(&test_config(), tx, Box::new(clipboard)), rx)
    }

    fn test_app() -> (App, mpsc::Receiver<Command>) {
        app_with(RecordingClipboard::default())
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn status(epoch: RunEpoch, is_running: bool) -> AppEvent {
        AppEvent::Status {
            epoch,
            result: Ok(StatusResponse {
                is_running,
                current_url: None,
                logs_path: None,
            }),
        }
    }

    fn connected_app() -> (App, mpsc::Receiver<Command>) {
        let (mut app, mut rx) = test_app();
        app.open_stream();
        assert_eq!(rx.try_recv().unwrap(), Command::OpenStream);
        app.apply_event_at(AppEvent::StreamOpened, at());
        (app, rx)
    }

    fn frame(text: &str) -> AppEvent {
        AppEvent::StreamFrame {
            text: text.to_string(),
            received_at: at(),
        }
    }

    #[test]
    fn start_is_optimistic() {
        let (mut app, mut rx) = test_app();
        press(&mut app, KeyCode::Char('+'));
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.run.state(), RunState::Running);
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::Start(StartRequest {
                epoch: RunEpoch(1),
                url: "https://example.com".to_string(),
                max_depth: 2,
            })
        );
        assert!(!app.can_start());
        assert!(app.can_stop());

        // A second start while Running does nothing.
        press(&mut app, KeyCode::Enter);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn empty_url_starts_nothing() {
        let (mut app, mut rx) = test_app();
        app.form.url = "   ".to_string();
        assert!(!app.can_start());
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.run.state(), RunState::Idle);
        assert!(rx.try_recv().is_err());
        assert!(app.status_note.is_some());
    }

    #[test]
    fn stop_before_start_reply_stays_idle() {
        let (mut app, mut rx) = test_app();
        app.start_run();
        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.run.state(), RunState::Idle);
        assert!(matches!(rx.try_recv().unwrap(), Command::Start(_)));
        assert_eq!(rx.try_recv().unwrap(), Command::Stop);

        app.apply_event_at(
            AppEvent::StartFinished {
                epoch: RunEpoch(1),
                result: Ok(MessageResponse::default()),
            },
            at(),
        );
        app.apply_event_at(status(RunEpoch(1), false), at());
        assert_eq!(app.run.state(), RunState::Idle);
        assert!(app.buffer.is_empty());
    }

    #[test]
    fn failed_start_reverts_to_idle() {
        let (mut app, _rx) = test_app();
        app.start_run();
        app.apply_event_at(
            AppEvent::StartFinished {
                epoch: RunEpoch(1),
                result: Err(BackendError::Status {
                    endpoint: "http://localhost:8000/start".to_string(),
                    status: 400,
                    body: "Scraper is already running".to_string(),
                }),
            },
            at(),
        );
        assert_eq!(app.run.state(), RunState::Idle);
        assert!(app.can_start());
    }

    #[test]
    fn stale_start_failure_is_ignored() {
        let (mut app, _rx) = test_app();
        app.start_run();
        app.stop_run();
        app.start_run();
        assert_eq!(app.run.epoch(), RunEpoch(2));
        app.apply_event_at(
            AppEvent::StartFinished {
                epoch: RunEpoch(1),
                result: Err(BackendError::Decode {
                    endpoint: "http://localhost:8000/start".to_string(),
                    message: "bad".to_string(),
                }),
            },
            at(),
        );
        assert_eq!(app.run.state(), RunState::Running);
    }

    #[test]
    fn completion_is_logged_once() {
        let (mut app, mut rx) = test_app();
        app.start_run();
        let _ = rx.try_recv();

        app.queue_probe();
        assert_eq!(rx.try_recv().unwrap(), Command::Probe(RunEpoch(1)));
        app.apply_event_at(status(RunEpoch(1), true), at());
        assert!(app.buffer.is_empty());

        app.apply_event_at(status(RunEpoch(1), false), at());
        app.apply_event_at(status(RunEpoch(1), false), at());
        assert_eq!(app.buffer.len(), 1);
        let entry = app.buffer.last().unwrap();
        assert_eq!(entry.level, LEVEL_SYSTEM);
        assert_eq!(entry.message, COMPLETED_MESSAGE);
        assert_eq!(app.run.state(), RunState::Idle);

        // Idle runs are never probed.
        app.queue_probe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn probe_failures_are_not_logged_to_the_buffer() {
        let (mut app, _rx) = test_app();
        app.start_run();
        app.apply_event_at(
            AppEvent::Status {
                epoch: RunEpoch(1),
                result: Err(BackendError::Status {
                    endpoint: "http://localhost:8000/status".to_string(),
                    status: 500,
                    body: String::new(),
                }),
            },
            at(),
        );
        assert!(app.buffer.is_empty());
        assert!(app.run.is_running());
    }

    #[test]
    fn stream_events_feed_the_buffer() {
        let (mut app, _rx) = connected_app();
        assert_eq!(app.connection.state(), ConnectionState::Connected);
        assert_eq!(app.buffer.entries()[0].message, CONNECTED_MESSAGE);

        app.apply_event_at(
            frame(r#"{"timestamp":"2024-05-01T10:00:00","level":"INFO","message":"Crawling"}"#),
            at(),
        );
        app.apply_event_at(frame("plain text"), at());
        let messages: Vec<_> = app
            .buffer
            .entries()
            .iter()
            .map(|entry| entry.message.as_str())
            .collect();
        assert_eq!(messages, vec![CONNECTED_MESSAGE, "Crawling", "plain text"]);

        app.apply_event_at(
            AppEvent::StreamErrored {
                reason: "reset".to_string(),
            },
            at(),
        );
        let last = app.buffer.last().unwrap();
        assert_eq!(last.level, LEVEL_ERROR);
        assert!(last.message.contains("ws://localhost:8000/logs"));
        assert_eq!(app.connection.state(), ConnectionState::Errored);
    }

    #[test]
    fn reconnect_is_only_offered_when_closed_or_errored() {
        let (mut app, mut rx) = connected_app();
        press(&mut app, KeyCode::Char('c'));
        assert!(rx.try_recv().is_err());

        app.apply_event_at(AppEvent::StreamClosed, at());
        assert_eq!(app.connection.state(), ConnectionState::Disconnected);
        press(&mut app, KeyCode::Char('c'));
        assert_eq!(rx.try_recv().unwrap(), Command::OpenStream);
        assert_eq!(app.connection.state(), ConnectionState::Connecting);
    }

    #[test]
    fn teardown_drops_late_events() {
        let (mut app, _rx) = connected_app();
        app.start_run();
        assert!(app.begin_teardown());
        assert!(!app.begin_teardown());

        let before = app.buffer.len();
        app.apply_event_at(frame("late"), at());
        app.apply_event_at(status(RunEpoch(1), false), at());
        app.apply_event_at(
            AppEvent::StreamErrored {
                reason: "gone".to_string(),
            },
            at(),
        );
        assert_eq!(app.buffer.len(), before);
        assert!(app.run.is_running());
    }

    #[test]
    fn edit_mode_captures_keys() {
        let (mut app, mut rx) = test_app();
        press(&mut app, KeyCode::Char('i'));
        assert!(app.form.editing);
        app.handle_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        assert!(app.form.url.is_empty());

        // Global keys are plain text while editing.
        type_text(&mut app, " https://qx.dev ");
        assert!(!press(&mut app, KeyCode::Char('q')));
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Enter);
        assert!(!app.form.editing);
        assert_eq!(app.form.url, "https://qx.dev");
        assert!(rx.try_recv().is_err());
        assert_eq!(app.run.state(), RunState::Idle);
    }

    #[test]
    fn depth_stays_in_range() {
        let (mut app, _rx) = test_app();
        press(&mut app, KeyCode::Char('-'));
        assert_eq!(app.form.max_depth, MIN_DEPTH);
        for _ in 0..20 {
            press(&mut app, KeyCode::Right);
        }
        assert_eq!(app.form.max_depth, MAX_DEPTH);
    }

    #[test]
    fn artifact_actions_need_logs() {
        let (mut app, mut rx) = test_app();
        assert!(!app.can_save());
        assert!(!app.can_view());
        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('v'));
        assert!(rx.try_recv().is_err());

        app.buffer.push(crawlctl_core::LogEntry::system_at("hello", at()));
        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('v'));
        assert_eq!(rx.try_recv().unwrap(), Command::SaveArtifact);
        assert_eq!(rx.try_recv().unwrap(), Command::FetchArtifact);
        assert!(app.saving_artifact);
        assert!(app.loading_artifact);
        assert!(!app.can_view());

        // No duplicate fetch while one is loading.
        press(&mut app, KeyCode::Char('v'));
        assert!(rx.try_recv().is_err());

        app.apply_event_at(
            AppEvent::ArtifactSaved {
                result: Err(anyhow::anyhow!("disk full")),
            },
            at(),
        );
        assert!(!app.saving_artifact);
        assert_eq!(app.status_note.as_deref(), Some("artifact save failed"));
    }

    fn explorer_app(clipboard: RecordingClipboard) -> App {
        let (mut app, _rx) = app_with(clipboard);
        app.loading_artifact = true;
        app.apply_event_at(
            AppEvent::ArtifactFetched {
                result: Ok("{\"title\":\"A\",\"links\":[\"x\"]}\nnot json\n".to_string()),
            },
            at(),
        );
        app
    }

    #[test]
    fn fetched_artifact_opens_explorer() {
        let app = explorer_app(RecordingClipboard::default());
        assert!(!app.loading_artifact);
        let explorer = app.explorer.as_ref().unwrap();
        assert_eq!(explorer.root_key(), ARTIFACT_ROOT_KEY);
        let keys: Vec<_> = explorer.rows().iter().map(|row| row.key.as_str()).collect();
        assert_eq!(keys, vec!["data", "0", "title", "links", "1", "raw"]);
        assert_eq!(app.status_note.as_deref(), Some("loaded 2 records"));
    }

    #[test]
    fn failed_fetch_leaves_explorer_closed() {
        let (mut app, _rx) = test_app();
        app.loading_artifact = true;
        app.apply_event_at(
            AppEvent::ArtifactFetched {
                result: Err(BackendError::Status {
                    endpoint: "http://localhost:8000/download".to_string(),
                    status: 404,
                    body: String::new(),
                }),
            },
            at(),
        );
        assert!(app.explorer.is_none());
        assert!(!app.loading_artifact);
    }

    #[test]
    fn explorer_keys_navigate_and_toggle() {
        let mut app = explorer_app(RecordingClipboard::default());
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Char('j'));
        let selected = |app: &App| {
            let explorer = app.explorer.as_ref().unwrap();
            explorer.selected_row().unwrap().key.clone()
        };
        assert_eq!(selected(&app), "links");

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.explorer.as_ref().unwrap().rows().len(), 7);
        press(&mut app, KeyCode::Char('h'));
        assert_eq!(app.explorer.as_ref().unwrap().rows().len(), 6);

        press(&mut app, KeyCode::Char('G'));
        assert_eq!(selected(&app), "raw");
        press(&mut app, KeyCode::Char('g'));
        assert_eq!(selected(&app), "data");

        // Quit keys only close the overlay.
        assert!(!press(&mut app, KeyCode::Char('q')));
        assert!(app.explorer.is_none());
    }

    #[test]
    fn copy_is_acknowledged_briefly() {
        let clipboard = RecordingClipboard::default();
        let copied = clipboard.copied.clone();
        let mut app = explorer_app(clipboard);
        let explorer = app.explorer.as_mut().unwrap();
        explorer.move_selection(2);
        let path = explorer.selected_row().unwrap().path.clone();

        let now = Instant::now();
        app.copy_selected(now);
        assert_eq!(*copied.borrow(), vec!["A".to_string()]);
        assert!(app.is_copy_acknowledged(&path));

        app.on_tick(now + Duration::from_millis(1499));
        assert!(app.is_copy_acknowledged(&path));
        app.on_tick(now + COPY_ACK_DURATION);
        assert!(!app.is_copy_acknowledged(&path));
    }

    #[test]
    fn containers_and_failed_writes_are_not_acknowledged() {
        let clipboard = RecordingClipboard {
            fail: true,
            ..RecordingClipboard::default()
        };
        let mut app = explorer_app(clipboard);
        let now = Instant::now();

        app.copy_selected(now);
        assert!(app.copy_ack.is_none());
        assert_eq!(app.status_note.as_deref(), Some("select a value to copy"));

        app.explorer.as_mut().unwrap().move_selection(2);
        app.copy_selected(now);
        assert!(app.copy_ack.is_none());
        assert_eq!(app.status_note.as_deref(), Some("copy failed"));
    }

    #[test]
    fn help_overlay_swallows_keys() {
        let (mut app, mut rx) = test_app();
        press(&mut app, KeyCode::Char('?'));
        assert!(app.help_open);
        assert!(!press(&mut app, KeyCode::Char('q')));
        press(&mut app, KeyCode::Enter);
        assert!(rx.try_recv().is_err());
        press(&mut app, KeyCode::Esc);
        assert!(!app.help_open);
        assert!(press(&mut app, KeyCode::Char('q')));
    }

    #[test]
    fn ctrl_c_always_quits() {
        let (mut app, _rx) = test_app();
        app.form.editing = true;
        assert!(app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }

    #[test]
    fn full_queue_reverts_optimistic_start() {
        let (tx, _rx) = mpsc::channel(1);
        let mut app = App::new(&test_config(), tx, Box::new(RecordingClipboard::default()));
        app.open_stream();
        app.start_run();
        assert_eq!(app.run.state(), RunState::Idle);
        assert_eq!(app.status_note.as_deref(), Some("command queue full; try again"));
    }
}
