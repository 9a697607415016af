use crate::entry::LogEntry;
use std::ops::Range;

/// Append-only store behind the live execution log.
///
/// The view follows the newest entry. Scrolling back is allowed between
/// appends; every append re-pins the view to the tail.
#[derive(Debug, Default, Clone)]
pub struct LogBuffer {
    entries: Vec<LogEntry>,
    scroll_back: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
        self.scroll_back = 0;
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn is_following(&self) -> bool {
        self.scroll_back == 0
    }

    pub fn scroll_back(&self) -> usize {
        self.scroll_back
    }

    pub fn scroll_up(&mut self, rows: usize) {
        let max = self.entries.len().saturating_sub(1);
        self.scroll_back = self.scroll_back.saturating_add(rows).min(max);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(rows);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_back = self.entries.len().saturating_sub(1);
    }

    pub fn follow(&mut self) {
        self.scroll_back = 0;
    }

    /// Index range of the entries that fit in a viewport of `height` rows,
    /// one row per entry.
    pub fn visible_window(&self, height: usize) -> Range<usize> {
        self.visible_window_by(height, |_| 1)
    }

    /// Like [`LogBuffer::visible_window`] for entries that take `rows_of`
    /// rows each. The oldest entry in the range may only partly fit.
    pub fn visible_window_by<F>(&self, height: usize, rows_of: F) -> Range<usize>
    where
        F: Fn(&LogEntry) -> usize,
    {
        let end = self.entries.len().saturating_sub(self.scroll_back);
        let mut start = end;
        let mut used = 0;
        while start > 0 && used < height {
            start -= 1;
            used += rows_of(&self.entries[start]).max(1);
        }
        start..end
    }
}
