//! Rendering for the overview list, session drill-down, and the
//! sort/filter modal. Pure `Frame` drawing — no state mutation here.

use super::app::{App, ModalTab, View};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let size = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(size);

    match app.view {
        View::Overview => draw_overview(f, app, chunks[0]),
        View::Session => draw_session(f, app, chunks[0]),
        View::Modal => {
            draw_overview(f, app, chunks[0]);
            draw_modal(f, app, size);
        }
        View::Log => draw_log(f, app, chunks[0]),
    }

    draw_status_bar(f, app, chunks[1]);
}

fn draw_overview(f: &mut Frame, app: &App, area: Rect) {
    let Some(overview) = &app.overview else {
        f.render_widget(Paragraph::new("loading..."), area);
        return;
    };

    let header = Row::new(vec!["Session", "Model", "Status", "Cost", "Tokens", "Duration"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = overview
        .sessions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let style = if i == app.cursor {
                Style::default().bg(Color::Blue).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(s.label.clone()),
                Cell::from(s.model.clone()),
                Cell::from(s.status.as_str()),
                Cell::from(format!("${:.2}", s.total_cost)),
                Cell::from(format!("{}", s.input_tokens + s.output_tokens)),
                Cell::from(format!("{}ms", s.duration_ns / 1_000_000)),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(30),
            Constraint::Percentage(20),
            Constraint::Percentage(12),
            Constraint::Percentage(12),
            Constraint::Percentage(13),
            Constraint::Percentage(13),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(format!(
        " Sessions ({} total, {:.0}% success) ",
        overview.sessions.len(),
        overview.success_rate * 100.0
    )));

    f.render_widget(table, area);
}

fn draw_session(f: &mut Frame, app: &App, area: Rect) {
    let Some(detail) = &app.session_detail else {
        f.render_widget(Paragraph::new("loading..."), area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let summary = &detail.summary;
    let header = Paragraph::new(format!(
        "{}  model={}  status={}  cost=${:.2}  tools={}",
        summary.label,
        summary.model,
        summary.status,
        summary.total_cost,
        summary.tool_calls
    ))
    .block(Block::default().borders(Borders::ALL).title(" Session "));
    f.render_widget(header, chunks[0]);

    let items: Vec<ListItem> = detail
        .messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let style = if i == app.message_cursor {
                Style::default().bg(Color::Blue).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let preview: String = m.text.chars().take(120).collect();
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{:>4}ms] ", m.delta_ns / 1_000_000), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{}: ", m.role), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(preview),
            ]))
            .style(style)
        })
        .collect();

    let replay_marker = if app.replay_on { " [replaying]" } else { "" };
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Messages{replay_marker} ")),
    );
    f.render_widget(list, chunks[1]);
}

fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    use crate::logging::LogLevel;

    let entries = app.log_buffer.get_all();
    let items: Vec<ListItem> = entries
        .iter()
        .map(|e| {
            let color = match e.level {
                LogLevel::Error => Color::Red,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Info => Color::White,
                LogLevel::Debug | LogLevel::Trace => Color::DarkGray,
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", e.timestamp.format("%H:%M:%S")), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<5} ", e.level.as_str()), Style::default().fg(color)),
                Span::raw(e.message.clone()),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Logs "));
    f.render_widget(list, area);
}

fn draw_modal(f: &mut Frame, app: &App, area: Rect) {
    let width = (area.width * 2 / 3).max(30);
    let height = (area.height / 2).max(8);
    let modal_area = Rect {
        x: (area.width.saturating_sub(width)) / 2,
        y: (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };

    f.render_widget(Clear, modal_area);

    let (title, lines) = match app.modal_tab {
        ModalTab::Sort => (
            " Sort (tab to switch, j/k to change, esc to close) ",
            vec!["date", "cost", "tokens", "duration"]
                .into_iter()
                .enumerate()
                .map(|(i, label)| {
                    if i == app.sort_index {
                        Line::from(Span::styled(format!("> {label}"), Style::default().add_modifier(Modifier::BOLD)))
                    } else {
                        Line::from(format!("  {label}"))
                    }
                })
                .collect::<Vec<_>>(),
        ),
        ModalTab::Filter => (
            " Filter by status (tab to switch, j/k to change, esc to close) ",
            vec!["all", "completed", "failed", "abandoned", "unknown"]
                .into_iter()
                .enumerate()
                .map(|(i, label)| {
                    if i == app.status_filter_index {
                        Line::from(Span::styled(format!("> {label}"), Style::default().add_modifier(Modifier::BOLD)))
                    } else {
                        Line::from(format!("  {label}"))
                    }
                })
                .collect::<Vec<_>>(),
        ),
    };

    let block = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(block, modal_area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let text = if let Some(err) = &app.error {
        Line::from(Span::styled(format!(" error: {err}"), Style::default().fg(Color::Red)))
    } else {
        Line::from(" j/k move  l/enter open  h/esc back  s sort  f filter  p period  r replay  L logs  q/ctrl+c quit ")
    };
    f.render_widget(Paragraph::new(text), area);
}
