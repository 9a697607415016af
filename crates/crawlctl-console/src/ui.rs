use crate::app::App;
use crate::theme::{self, icons};
use crawlctl_core::tree::{RowNode, TreeRow};
use crawlctl_core::{parse_timestamp, LogEntry, ARTIFACT_FILE_NAME};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        block::{Position, Title},
        Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap,
    },
    Frame,
};
use serde_json::Value;
use unicode_width::UnicodeWidthChar;

const CONFIG_PANEL_WIDTH: u16 = 44;
const LEVEL_WIDTH: usize = 7;
const EMPTY_LOG_PLACEHOLDER: &str = "Ready to initialize sequence...";

pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.size();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(area);
    frame.render_widget(render_header(app), layout[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(CONFIG_PANEL_WIDTH), Constraint::Min(0)])
        .split(layout[1]);
    render_config_panel(frame, app, body[0]);
    render_log_panel(frame, app, body[1]);

    if app.explorer.is_some() {
        render_explorer_overlay(frame, app);
    }
    if app.help_open {
        render_help_overlay(frame, app);
    }
}

fn render_header(app: &App) -> Paragraph<'static> {
    let connection = app.connection.state();
    let run = app.run.state();
    let status_line = Line::from(vec![
        Span::styled("crawlctl", theme::HEADER_STYLE),
        Span::raw("  "),
        Span::styled("stream ", Style::default().fg(theme::MUTED)),
        Span::styled(
            connection.label(),
            Style::default()
                .fg(theme::connection_color(connection))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled("run ", Style::default().fg(theme::MUTED)),
        Span::styled(
            run.label(),
            Style::default()
                .fg(theme::run_color(run))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled("backend ", Style::default().fg(theme::MUTED)),
        Span::styled(
            app.api_base.as_str().trim_end_matches('/').to_string(),
            Style::default().fg(theme::TEXT),
        ),
    ]);
    let note_line = match &app.status_note {
        Some(note) => Line::from(Span::styled(
            note.clone(),
            Style::default().fg(theme::status_note_color(note)),
        )),
        None => Line::from(Span::styled(
            "press ? for keys",
            Style::default().fg(theme::MUTED),
        )),
    };
    Paragraph::new(Text::from(vec![status_line, note_line])).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme::BORDER)),
    )
}

fn render_config_panel(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme::BORDER))
        .title(Span::styled("Configuration", theme::HEADER_STYLE));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let url_style = if app.form.editing {
        Style::default().fg(theme::TITLE).add_modifier(Modifier::UNDERLINED)
    } else {
        Style::default().fg(theme::TEXT)
    };
    let url_text = if app.form.url.is_empty() && !app.form.editing {
        Span::styled("https://example.com", theme::DISABLED_STYLE)
    } else {
        Span::styled(app.form.url.clone(), url_style)
    };

    let mut lines = vec![
        section_label("TARGET URL"),
        Line::from(vec![Span::styled("> ", theme::KEY_STYLE), url_text]),
        Line::from(""),
        section_label("CRAWL DEPTH"),
        Line::from(vec![
            Span::styled("- ", theme::KEY_STYLE),
            Span::styled(
                format!("{:>2}", app.form.max_depth),
                Style::default().fg(theme::TITLE).add_modifier(Modifier::BOLD),
            ),
            Span::styled(" +", theme::KEY_STYLE),
            Span::raw("  "),
            Span::styled(
                depth_bar(app.form.max_depth),
                Style::default().fg(theme::ACCENT),
            ),
        ]),
        Line::from(""),
        section_label("ACTIONS"),
        action_line("Enter", "Start crawl", app.can_start()),
        action_line("x", "Stop", app.can_stop()),
        action_line("d", "Save JSON artifact", app.can_save()),
        action_line(
            "v",
            if app.loading_artifact {
                "Loading..."
            } else {
                "View scraped data"
            },
            app.can_view(),
        ),
        action_line("c", "Reconnect stream", app.connection.state().can_open()),
        Line::from(""),
        Line::from(vec![
            Span::styled("Session ", Style::default().fg(theme::MUTED)),
            Span::styled(
                app.run.state().label(),
                Style::default().fg(theme::run_color(app.run.state())),
            ),
        ]),
    ];
    if app.form.editing {
        lines.push(Line::from(Span::styled(
            "Enter/Esc done  Ctrl-U clear",
            Style::default().fg(theme::MUTED),
        )));
    }
    frame.render_widget(Paragraph::new(Text::from(lines)), inner);

    if app.form.editing && inner.height > 1 {
        let typed = app.form.url.chars().count() as u16;
        let x = inner.x + (2 + typed).min(inner.width.saturating_sub(1));
        frame.set_cursor(x, inner.y + 1);
    }
}

fn section_label(label: &'static str) -> Line<'static> {
    Line::from(Span::styled(
        label,
        Style::default()
            .fg(theme::MUTED)
            .add_modifier(Modifier::BOLD),
    ))
}

fn action_line(key: &'static str, label: &'static str, enabled: bool) -> Line<'static> {
    if !enabled {
        return Line::from(vec![
            Span::styled(format!("{key:<6}"), theme::DISABLED_STYLE),
            Span::styled(label, theme::DISABLED_STYLE),
        ]);
    }
    Line::from(vec![
        Span::styled(format!("{key:<6}"), theme::KEY_STYLE),
        Span::styled(label, Style::default().fg(theme::TEXT)),
    ])
}

fn depth_bar(depth: u8) -> String {
    let filled = usize::from(depth);
    let max = usize::from(crawlctl_core::run::MAX_DEPTH);
    format!("{}{}", "#".repeat(filled), ".".repeat(max.saturating_sub(filled)))
}

fn render_log_panel(frame: &mut Frame, app: &App, area: Rect) {
    let follow = if app.buffer.is_following() {
        Span::styled(format!(" {} following", icons::DOT), Style::default().fg(theme::MUTED))
    } else {
        Span::styled(
            format!(" +{} newer (End to follow)", app.buffer.scroll_back()),
            Style::default().fg(theme::ACCENT),
        )
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme::BORDER))
        .title(Line::from(vec![
            Span::styled("Live Execution Log", theme::HEADER_STYLE),
            follow,
        ]));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.buffer.is_empty() {
        let middle = inner.height / 2;
        let placeholder = Rect {
            y: inner.y + middle,
            height: inner.height.saturating_sub(middle).min(1),
            ..inner
        };
        frame.render_widget(
            Paragraph::new(Span::styled(
                EMPTY_LOG_PLACEHOLDER,
                Style::default().fg(theme::MUTED),
            ))
            .alignment(Alignment::Center),
            placeholder,
        );
        return;
    }

    let width = usize::from(inner.width);
    let height = usize::from(inner.height);
    let window = app
        .buffer
        .visible_window_by(height, |entry| log_rows(entry, width).len());
    let rows: Vec<Line> = app.buffer.entries()[window]
        .iter()
        .flat_map(|entry| log_rows(entry, width))
        .collect();
    // Newest rows stay pinned to the bottom; the oldest entry may be cut.
    let overflow = rows.len().saturating_sub(height);
    let lines: Vec<Line> = rows.into_iter().skip(overflow).collect();
    frame.render_widget(Paragraph::new(Text::from(lines)), inner);
}

/// One entry as display rows: message lines split on `\n`, then every line
/// broken at `width` columns wherever it falls.
fn log_rows(entry: &LogEntry, width: usize) -> Vec<Line<'static>> {
    let style = theme::level_style(entry.severity());
    let mut message_lines = entry
        .message
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let mut first = vec![
        Span::styled(
            display_time(&entry.timestamp),
            Style::default().fg(theme::MUTED),
        ),
        Span::raw("  "),
        Span::styled(format!("{:<width$}", entry.level, width = LEVEL_WIDTH), style.level),
        Span::raw(" "),
        Span::styled(
            message_lines.next().unwrap_or_default().to_string(),
            style.message,
        ),
    ];
    let mut logical = Vec::new();
    for line in message_lines {
        logical.push(vec![Span::styled(line.to_string(), style.message)]);
    }
    let extras = entry.extra.iter().map(|(key, value)| {
        Span::styled(
            format!("  {key}={}", extra_value(value)),
            Style::default().fg(theme::MUTED),
        )
    });
    match logical.last_mut() {
        Some(last) => last.extend(extras),
        None => first.extend(extras),
    }
    logical.insert(0, first);

    logical
        .into_iter()
        .flat_map(|spans| {
            let spans = spans
                .into_iter()
                .map(|span| {
                    let patched = style.row.patch(span.style);
                    Span::styled(span.content, patched)
                })
                .collect();
            wrap_spans(spans, width)
        })
        .collect()
}

fn wrap_spans(spans: Vec<Span<'static>>, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut row: Vec<Span<'static>> = Vec::new();
    let mut used = 0;
    for span in spans {
        let mut chunk = String::new();
        for ch in span.content.chars() {
            let cols = ch.width().unwrap_or(0);
            if used > 0 && used + cols > width {
                if !chunk.is_empty() {
                    row.push(Span::styled(std::mem::take(&mut chunk), span.style));
                }
                rows.push(Line::from(std::mem::take(&mut row)));
                used = 0;
            }
            chunk.push(ch);
            used += cols;
        }
        if !chunk.is_empty() {
            row.push(Span::styled(chunk, span.style));
        }
    }
    if !row.is_empty() || rows.is_empty() {
        rows.push(Line::from(row));
    }
    rows
}

/// `HH:MM:SS`, 24-hour, local time.
pub fn display_time(timestamp: &str) -> String {
    parse_timestamp(timestamp)
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn extra_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_explorer_overlay(frame: &mut Frame, app: &App) {
    let Some(explorer) = &app.explorer else {
        return;
    };
    let area = centered_rect(84, 80, frame.size());
    frame.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme::BORDER))
        .style(Style::default().bg(theme::SURFACE))
        .title(Span::styled("Scraped Data Viewer", theme::HEADER_STYLE))
        .title(
            Title::from(Span::styled(
                " j/k move  Enter toggle  h/l fold  y copy  Esc close ",
                Style::default().fg(theme::MUTED),
            ))
            .position(Position::Bottom),
        );
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let items: Vec<ListItem> = explorer
        .rows()
        .iter()
        .map(|row| ListItem::new(tree_line(row, app.is_copy_acknowledged(&row.path))))
        .collect();
    let list = List::new(items).highlight_style(theme::SELECTED_STYLE);
    let mut state = ListState::default().with_selected(Some(explorer.selected()));
    frame.render_stateful_widget(list, inner, &mut state);
}

fn tree_line(row: &TreeRow, copied: bool) -> Line<'static> {
    let indent = "  ".repeat(row.depth());
    let mut spans = vec![Span::raw(indent)];
    match &row.node {
        RowNode::Container {
            kind,
            len,
            expanded,
        } => {
            let icon = if !row.is_toggleable() {
                icons::LEAF
            } else if *expanded {
                icons::EXPANDED
            } else {
                icons::COLLAPSED
            };
            spans.push(Span::styled(format!("{icon} "), Style::default().fg(theme::MUTED)));
            spans.push(Span::styled(
                row.key.clone(),
                theme::KEY_STYLE.add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                format!(" {}", kind.badge(*len)),
                Style::default().fg(theme::MUTED),
            ));
        }
        RowNode::Scalar { kind, display } => {
            spans.push(Span::raw(format!("{} ", icons::LEAF)));
            spans.push(Span::styled(format!("{}: ", row.key), theme::KEY_STYLE));
            spans.push(Span::styled(
                display.clone(),
                Style::default().fg(theme::scalar_color(*kind)),
            ));
            if copied {
                spans.push(Span::styled(
                    format!("  {}", icons::COPIED),
                    Style::default().fg(theme::ACCENT),
                ));
            }
        }
    }
    Line::from(spans)
}

fn render_help_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 76, frame.size());
    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(theme::ACCENT)
                .add_modifier(Modifier::BOLD),
        ))
    };
    let mut lines = vec![
        Line::from(Span::styled("Controls", theme::HEADER_STYLE)),
        heading("Run"),
        Line::from("  i / e    edit target URL (Enter/Esc to finish)"),
        Line::from("  + / -    crawl depth (1-10)"),
        Line::from("  Enter    start crawl"),
        Line::from("  x        stop crawl"),
        Line::from(""),
        heading("Log"),
        Line::from("  PgUp/PgDn  scroll back / forward"),
        Line::from("  Home/End   oldest / follow newest"),
        Line::from("  c          reconnect log stream"),
        Line::from(""),
        heading("Data"),
        Line::from("  v        view scraped data"),
        Line::from(format!("  d        save {ARTIFACT_FILE_NAME}")),
        Line::from("  in viewer: j/k move, Enter/Space toggle, h/l fold, g/G ends, y copy"),
        Line::from(""),
        heading("Session & Exit"),
        Line::from("  ?        toggle this help"),
        Line::from("  q        quit (Ctrl-C anywhere)"),
    ];
    if let Some(path) = &app.log_path {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("developer log: {}", path.display()),
            Style::default().fg(theme::MUTED),
        )));
    }
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme::TEXT).bg(theme::SURFACE))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(theme::BORDER))
                    .style(Style::default().bg(theme::SURFACE))
                    .title(Span::styled("Help", theme::HEADER_STYLE)),
            )
            .wrap(Wrap { trim: false }),
        area,
    );
}

/// A `width_pct` by `height_pct` box centred in `area`.
fn centered_rect(width_pct: u16, height_pct: u16, area: Rect) -> Rect {
    let scale = |len: u16, pct: u16| (u32::from(len) * u32::from(pct.min(100)) / 100) as u16;
    let width = scale(area.width, width_pct);
    let height = scale(area.height, height_pct);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
