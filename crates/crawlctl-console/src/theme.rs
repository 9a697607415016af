use crawlctl_core::tree::ScalarKind;
use crawlctl_core::{ConnectionState, RunState, Severity};
use ratatui::style::{Color, Modifier, Style};

pub const SURFACE: Color = Color::Rgb(17, 24, 39);
pub const BORDER: Color = Color::Rgb(63, 63, 70);
pub const TITLE: Color = Color::Rgb(228, 228, 231);
pub const TEXT: Color = Color::Rgb(212, 212, 216);
pub const MUTED: Color = Color::Rgb(113, 113, 122);
pub const ACCENT: Color = Color::Rgb(56, 189, 248);

const RED: Color = Color::Rgb(239, 68, 68);
const RED_TEXT: Color = Color::Rgb(254, 202, 202);
const RED_ROW: Color = Color::Rgb(45, 16, 16);
const AMBER: Color = Color::Rgb(245, 158, 11);
const EMERALD: Color = Color::Rgb(16, 185, 129);
const BLUE: Color = Color::Rgb(96, 165, 250);
const PURPLE: Color = Color::Rgb(192, 132, 252);
const GRAY: Color = Color::Rgb(161, 161, 170);

pub const HEADER_STYLE: Style = Style::new().fg(TITLE).add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(39, 39, 42))
    .add_modifier(Modifier::BOLD);
pub const KEY_STYLE: Style = Style::new().fg(BLUE);
pub const DISABLED_STYLE: Style = Style::new().fg(Color::Rgb(82, 82, 91));

pub mod icons {
    pub const EXPANDED: &str = "v";
    pub const COLLAPSED: &str = ">";
    pub const LEAF: &str = " ";
    pub const COPIED: &str = "copied";
    pub const DOT: &str = "*";
}

/// Row treatment for a log line. Only the three backend levels get their own
/// accent; everything else, `RAW` and `SYSTEM` included, is neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelStyle {
    pub row: Style,
    pub level: Style,
    pub message: Style,
}

pub fn level_style(severity: Severity) -> LevelStyle {
    match severity {
        Severity::Error => LevelStyle {
            row: Style::new().bg(RED_ROW),
            level: Style::new().fg(RED).add_modifier(Modifier::BOLD),
            message: Style::new().fg(RED_TEXT),
        },
        Severity::Warning => LevelStyle {
            row: Style::new(),
            level: Style::new().fg(AMBER).add_modifier(Modifier::BOLD),
            message: Style::new().fg(TEXT),
        },
        Severity::Info => LevelStyle {
            row: Style::new(),
            level: Style::new().fg(EMERALD).add_modifier(Modifier::BOLD),
            message: Style::new().fg(TEXT),
        },
        Severity::Neutral => LevelStyle {
            row: Style::new(),
            level: Style::new().fg(BLUE).add_modifier(Modifier::BOLD),
            message: Style::new().fg(TEXT),
        },
    }
}

pub fn scalar_color(kind: ScalarKind) -> Color {
    match kind {
        ScalarKind::String => EMERALD,
        ScalarKind::Number => AMBER,
        ScalarKind::Boolean => PURPLE,
        ScalarKind::Null => GRAY,
    }
}

pub fn connection_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Connected => EMERALD,
        ConnectionState::Connecting => AMBER,
        ConnectionState::Errored => RED,
        ConnectionState::Disconnected => MUTED,
    }
}

pub fn run_color(state: RunState) -> Color {
    match state {
        RunState::Running => EMERALD,
        RunState::Idle => MUTED,
    }
}

pub fn status_note_color(note: &str) -> Color {
    let normalized = note.to_ascii_lowercase();
    if normalized.contains("failed") || normalized.contains("could not") {
        return RED;
    }
    if normalized.contains("requested") || normalized.contains("saved") || normalized.contains("loaded")
    {
        return ACCENT;
    }
    AMBER
}
