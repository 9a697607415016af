use crate::entry::LogEntry;
use chrono::{DateTime, Utc};
use std::fmt;

pub const COMPLETED_MESSAGE: &str = "Scraping completed!";
pub const MIN_DEPTH: u8 = 1;
pub const MAX_DEPTH: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Running => "Active",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identifies one Idle -> Running period. Replies issued under an older epoch
/// are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RunEpoch(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub epoch: RunEpoch,
    pub url: String,
    pub max_depth: u8,
}

pub fn clamp_depth(depth: i64) -> u8 {
    depth.clamp(i64::from(MIN_DEPTH), i64::from(MAX_DEPTH)) as u8
}

/// Idle/Running state machine for the crawl job.
///
/// `start` flips to Running before the backend has answered; a failed start
/// reverts. `stop` is unconditional. The status probe only matters while
/// Running and only for the current epoch.
#[derive(Debug, Default)]
pub struct RunCoordinator {
    state: RunState,
    epoch: RunEpoch,
}

impl RunCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn epoch(&self) -> RunEpoch {
        self.epoch
    }

    /// Whether the status probe schedule should exist right now.
    pub fn should_probe(&self) -> bool {
        self.is_running()
    }

    /// Optimistically enters Running and hands back the command to send.
    /// Empty URLs and starts while already Running are ignored.
    pub fn start(&mut self, url: &str, max_depth: u8) -> Option<StartRequest> {
        let url = url.trim();
        if url.is_empty() || self.is_running() {
            return None;
        }
        self.epoch = RunEpoch(self.epoch.0 + 1);
        self.state = RunState::Running;
        Some(StartRequest {
            epoch: self.epoch,
            url: url.to_string(),
            max_depth,
        })
    }

    /// Returns `true` when the failure reverted the current run.
    pub fn on_start_failed(&mut self, epoch: RunEpoch) -> bool {
        if epoch != self.epoch || !self.is_running() {
            return false;
        }
        self.state = RunState::Idle;
        true
    }

    /// Always ends up Idle. Returns `true` if a run was actually active.
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        self.state = RunState::Idle;
        was_running
    }

    /// Applies a status probe answer. The completion entry is produced at most
    /// once per run: after the first not-running report the state is Idle and
    /// later reports fall through.
    pub fn on_status(
        &mut self,
        epoch: RunEpoch,
        is_running: bool,
        at: DateTime<Utc>,
    ) -> Option<LogEntry> {
        if epoch != self.epoch || !self.is_running() || is_running {
            return None;
        }
        self.state = RunState::Idle;
        Some(LogEntry::system_at(COMPLETED_MESSAGE, at))
    }
}
