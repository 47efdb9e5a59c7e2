//! Terminal UI: overview list, session drill-down, and a sort/filter
//! modal, driven by the cooperative reducer in `app` (spec §4.9).

pub mod app;
pub mod scroll;
mod view;

use crate::cancel::CancellationToken;
use crate::logging::LogBuffer;
use crate::query::QueryEngine;
use anyhow::{Context, Result};
use app::{App, Command, Message};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

const REPLAY_TICK: Duration = Duration::from_millis(300);
const KEY_POLL: Duration = Duration::from_millis(10);

/// Runs the TUI until the user quits or `cancel` fires. Restores the
/// terminal on every exit path, including early errors.
pub async fn run_tui(
    query: Arc<QueryEngine>,
    refresh_interval_secs: u64,
    log_buffer: LogBuffer,
    cancel: CancellationToken,
) -> Result<()> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    let mut app = App::new(refresh_interval_secs, log_buffer);
    let result = run_event_loop(&mut terminal, &mut app, &query, &cancel).await;

    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    result
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    query: &Arc<QueryEngine>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut queue: VecDeque<Command> = VecDeque::from([Command::LoadOverview]);
    if app.refresh_interval_secs > 0 {
        queue.push_back(Command::ScheduleRefreshTick);
    }

    loop {
        while let Some(cmd) = queue.pop_front() {
            for next in run_command(cmd, app, query, cancel).await {
                queue.push_back(next);
            }
        }

        terminal.draw(|f| view::draw(f, app)).context("failed to draw terminal")?;

        if app.should_quit || cancel.is_cancelled() {
            break;
        }

        if event::poll(KEY_POLL).unwrap_or(false) {
            if let Ok(Event::Key(key_event)) = event::read() {
                if key_event.kind == KeyEventKind::Press {
                    queue.extend(app.update(Message::Key(key_event.code, key_event.modifiers)));
                }
            }
        } else if let Ok((w, h)) = crossterm::terminal::size() {
            if w != 0 && h != app.window_rows {
                queue.extend(app.update(Message::WindowResize(w, h)));
            }
        }
    }

    Ok(())
}

/// Interprets one `Command`: performs the I/O it names, folding the
/// result back through `App::update`, and returns whatever follow-up
/// `Command`s that produced.
async fn run_command(cmd: Command, app: &mut App, query: &Arc<QueryEngine>, cancel: &CancellationToken) -> Vec<Command> {
    match cmd {
        Command::LoadOverview => {
            let filters = app.filters();
            match query.overview(&filters, cancel) {
                Ok(overview) => app.update(Message::OverviewLoaded { overview: Some(overview), err: None }),
                Err(e) => app.update(Message::OverviewLoaded { overview: None, err: Some(e.to_string()) }),
            }
        }
        Command::LoadSession { id, keep_ui } => match query.session_detail(&id, cancel) {
            Ok(detail) => app.update(Message::SessionLoaded { detail: Some(detail), err: None, keep_ui }),
            Err(e) => app.update(Message::SessionLoaded { detail: None, err: Some(e.to_string()), keep_ui }),
        },
        Command::LoadAnalytics { id } => {
            let analytics = query.session_analytics(&id, cancel).ok();
            app.update(Message::Analytics(analytics))
        }
        Command::ScheduleReplayTick => {
            tokio::time::sleep(REPLAY_TICK).await;
            app.update(Message::ReplayTick)
        }
        Command::ScheduleRefreshTick => {
            tokio::time::sleep(Duration::from_secs(app.refresh_interval_secs.max(1))).await;
            app.update(Message::RefreshTick)
        }
        Command::Quit => {
            app.should_quit = true;
            vec![]
        }
    }
}
