mod app;
mod clipboard;
mod config;
mod logging;
mod stream;
mod tasks;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::{App, COMMAND_QUEUE_CAPACITY};
use clap::Parser;
use clipboard::TerminalClipboard;
use crawlctl_core::BackendClient;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, time::Duration};
use tasks::{Dispatcher, ProbeSchedule};
use tokio::sync::mpsc;
use tracing::info;

const EVENT_QUEUE_CAPACITY: usize = 256;
const UI_TICK: Duration = Duration::from_millis(250);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = config::load_config(config::Args::parse()).context("invalid configuration")?;
    let log_guard = logging::init_logging(&config);
    info!(
        event = "console_start",
        backend = %config.api_base,
        stream = %config.stream_url
    );

    let client = BackendClient::new(config.api_base.clone(), config.request_timeout)
        .context("building HTTP client")?;
    let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (event_tx, mut event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let mut dispatcher = Dispatcher::new(
        client,
        config.stream_url.clone(),
        config.download_dir.clone(),
        event_tx,
    );
    let mut app = App::new(&config, command_tx, Box::new(TerminalClipboard));
    app.log_path = log_guard.path().map(|path| path.to_path_buf());
    app.open_stream();
    let mut probes = ProbeSchedule::new(config.status_interval);

    let mut terminal = setup_terminal()?;
    let mut events = EventStream::new();
    let mut ui_tick = tokio::time::interval(UI_TICK);

    let result: Result<()> = async {
        loop {
            probes.sync(&app.run);
            terminal.draw(|frame| ui::render(frame, &app))?;
            tokio::select! {
                Some(command) = command_rx.recv() => {
                    dispatcher.dispatch(command);
                }
                Some(event) = event_rx.recv() => {
                    app.apply_event(event);
                }
                _ = probes.tick() => {
                    app.queue_probe();
                }
                _ = ui_tick.tick() => {
                    app.on_tick(std::time::Instant::now());
                }
                maybe_event = events.next() => {
                    match maybe_event {
                        Some(Ok(Event::Key(key)))
                            if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) =>
                        {
                            if app.handle_key(key) {
                                break;
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            return Err(err).context("reading terminal input");
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    // Teardown: nothing that arrives from here on may touch the app.
    app.begin_teardown();
    probes.cancel();
    dispatcher.shutdown().await;
    event_rx.close();
    info!(event = "console_stop");

    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
