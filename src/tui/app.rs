//! Cooperative single-thread TUI reducer (spec §4.9).
//!
//! `App::update` is the only place state mutates. It never performs I/O
//! itself — long-running work is requested via the returned `Command`s
//! and completes as a `Message` arriving on a later loop iteration.

use super::scroll::stable_scroll;
use crate::logging::LogBuffer;
use crate::model::{Filters, Overview, SessionAnalytics, SessionDetail, SortDir, SortKey};
use crossterm::event::{KeyCode, KeyModifiers};

const REPLAY_TICK_MS: u64 = 300;
const TIME_PERIODS: [&str; 3] = ["30d", "3M", "6M"];
const SORT_KEYS: [SortKey; 4] = [SortKey::Date, SortKey::Cost, SortKey::Tokens, SortKey::Duration];
const STATUS_FILTERS: [Option<&str>; 5] =
    [None, Some("completed"), Some("failed"), Some("abandoned"), Some("unknown")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Overview,
    Session,
    Modal,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalTab {
    Sort,
    Filter,
}

/// Messages the reducer responds to (spec §4.9).
pub enum Message {
    WindowResize(u16, u16),
    OverviewLoaded { overview: Option<Overview>, err: Option<String> },
    SessionLoaded { detail: Option<SessionDetail>, err: Option<String>, keep_ui: bool },
    Analytics(Option<SessionAnalytics>),
    ReplayTick,
    RefreshTick,
    Key(KeyCode, KeyModifiers),
}

/// Work the event loop must perform outside the reducer (I/O, timers).
#[derive(Debug, Clone)]
pub enum Command {
    LoadOverview,
    LoadSession { id: String, keep_ui: bool },
    LoadAnalytics { id: String },
    ScheduleReplayTick,
    ScheduleRefreshTick,
    Quit,
}

pub struct App {
    pub view: View,
    pub previous_view: View,

    pub overview: Option<Overview>,
    pub session_detail: Option<SessionDetail>,
    pub session_analytics: Option<SessionAnalytics>,
    pub error: Option<String>,

    pub cursor: usize,
    pub scroll_offset: usize,
    pub message_cursor: usize,
    pub message_scroll_offset: usize,

    pub sort_index: usize,
    pub status_filter_index: usize,
    pub message_sort_reversed: bool,
    pub time_period_index: usize,

    pub modal_tab: ModalTab,
    pub replay_on: bool,
    pub replay_on_load: bool,
    pub refresh_interval_secs: u64,

    pub window_rows: u16,
    pub should_quit: bool,
    pub log_buffer: LogBuffer,
}

impl App {
    pub fn new(refresh_interval_secs: u64, log_buffer: LogBuffer) -> Self {
        Self {
            view: View::Overview,
            previous_view: View::Overview,
            overview: None,
            session_detail: None,
            session_analytics: None,
            error: None,
            cursor: 0,
            scroll_offset: 0,
            message_cursor: 0,
            message_scroll_offset: 0,
            sort_index: 0,
            status_filter_index: 0,
            message_sort_reversed: false,
            time_period_index: 0,
            modal_tab: ModalTab::Sort,
            replay_on: false,
            replay_on_load: false,
            refresh_interval_secs,
            window_rows: 24,
            should_quit: false,
            log_buffer,
        }
    }

    pub fn filters(&self) -> Filters {
        let since_days = match TIME_PERIODS[self.time_period_index] {
            "30d" => 30,
            "3M" => 90,
            "6M" => 180,
            _ => 30,
        };
        Filters {
            sort: SORT_KEYS[self.sort_index],
            sort_dir: SortDir::Desc,
            status: STATUS_FILTERS[self.status_filter_index].map(str::to_string),
            since: Some(chrono::Duration::days(since_days)),
            ..Default::default()
        }
    }

    fn session_window(&self) -> usize {
        self.window_rows.saturating_sub(4).max(1) as usize
    }

    fn current_session_id(&self) -> Option<String> {
        self.overview
            .as_ref()
            .and_then(|o| o.sessions.get(self.cursor))
            .map(|s| s.id.clone())
    }

    /// The single entry point: applies `msg`, returns commands to run.
    pub fn update(&mut self, msg: Message) -> Vec<Command> {
        match msg {
            Message::WindowResize(_, rows) => {
                self.window_rows = rows;
                self.recompute_scroll();
                vec![]
            }
            Message::OverviewLoaded { overview, err } => {
                self.error = err;
                let previous_id = self.current_session_id();
                self.overview = overview;
                if let Some(overview) = &self.overview {
                    let still_present = previous_id
                        .as_ref()
                        .and_then(|id| overview.sessions.iter().position(|s| &s.id == id));
                    self.cursor = match still_present {
                        Some(idx) => idx,
                        None => self.cursor.min(overview.sessions.len().saturating_sub(1)),
                    };
                }
                self.recompute_scroll();
                vec![]
            }
            Message::SessionLoaded { detail, err, keep_ui } => {
                self.error = err;
                self.session_detail = detail;
                if keep_ui {
                    self.clamp_message_cursor();
                } else {
                    self.message_cursor = 0;
                    self.message_scroll_offset = 0;
                    self.message_sort_reversed = false;
                    if self.replay_on_load {
                        self.replay_on = true;
                        return vec![Command::ScheduleReplayTick];
                    }
                }
                vec![]
            }
            Message::Analytics(analytics) => {
                self.session_analytics = analytics;
                vec![]
            }
            Message::ReplayTick => {
                if !self.replay_on {
                    return vec![];
                }
                let last = self
                    .session_detail
                    .as_ref()
                    .map(|d| d.messages.len().saturating_sub(1))
                    .unwrap_or(0);
                if self.message_cursor >= last {
                    self.replay_on = false;
                    return vec![];
                }
                self.message_cursor += 1;
                self.recompute_message_scroll();
                vec![Command::ScheduleReplayTick]
            }
            Message::RefreshTick => {
                let mut cmds = match self.view {
                    View::Overview => vec![Command::LoadOverview],
                    View::Session | View::Modal | View::Log => self
                        .current_session_id()
                        .map(|id| vec![Command::LoadSession { id, keep_ui: true }])
                        .unwrap_or_default(),
                };
                if self.refresh_interval_secs > 0 {
                    cmds.push(Command::ScheduleRefreshTick);
                }
                cmds
            }
            Message::Key(key, modifiers) => self.handle_key(key, modifiers),
        }
    }

    fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> Vec<Command> {
        if let KeyCode::Char('c') = key {
            if modifiers.contains(KeyModifiers::CONTROL) {
                return vec![Command::Quit];
            }
        }
        if self.view == View::Modal {
            return self.handle_modal_key(key);
        }
        if self.view == View::Log {
            return self.handle_log_key(key);
        }
        match key {
            KeyCode::Char('q') => vec![Command::Quit],
            KeyCode::Char('L') => {
                self.previous_view = self.view;
                self.view = View::Log;
                vec![]
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.move_cursor(1);
                vec![]
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.move_cursor(-1);
                vec![]
            }
            KeyCode::Char('l') | KeyCode::Enter => self.drill(),
            KeyCode::Char('h') | KeyCode::Esc => {
                if self.view == View::Session {
                    self.view = View::Overview;
                    self.session_detail = None;
                    self.session_analytics = None;
                }
                vec![]
            }
            KeyCode::Char('s') => {
                if self.view == View::Overview {
                    self.modal_tab = ModalTab::Sort;
                    self.previous_view = self.view;
                    self.view = View::Modal;
                } else {
                    self.message_sort_reversed = !self.message_sort_reversed;
                }
                vec![]
            }
            KeyCode::Char('f') => {
                self.modal_tab = ModalTab::Filter;
                self.previous_view = self.view;
                self.view = View::Modal;
                vec![]
            }
            KeyCode::Char('p') => {
                self.time_period_index = (self.time_period_index + 1) % TIME_PERIODS.len();
                vec![Command::LoadOverview]
            }
            KeyCode::Char('r') => {
                if self.view == View::Session {
                    self.replay_on = !self.replay_on;
                    if self.replay_on {
                        return vec![Command::ScheduleReplayTick];
                    }
                    vec![]
                } else {
                    self.replay_on_load = true;
                    self.drill()
                }
            }
            _ => vec![],
        }
    }

    fn handle_modal_key(&mut self, key: KeyCode) -> Vec<Command> {
        match key {
            KeyCode::Char('h') | KeyCode::Esc => {
                self.view = self.previous_view;
                vec![]
            }
            KeyCode::Tab => {
                self.modal_tab = match self.modal_tab {
                    ModalTab::Sort => ModalTab::Filter,
                    ModalTab::Filter => ModalTab::Sort,
                };
                vec![]
            }
            KeyCode::Char('j') | KeyCode::Down if self.modal_tab == ModalTab::Sort => {
                self.sort_index = (self.sort_index + 1) % SORT_KEYS.len();
                vec![Command::LoadOverview]
            }
            KeyCode::Char('k') | KeyCode::Up if self.modal_tab == ModalTab::Sort => {
                self.sort_index = (self.sort_index + SORT_KEYS.len() - 1) % SORT_KEYS.len();
                vec![Command::LoadOverview]
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.status_filter_index = (self.status_filter_index + 1) % STATUS_FILTERS.len();
                vec![Command::LoadOverview]
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.status_filter_index =
                    (self.status_filter_index + STATUS_FILTERS.len() - 1) % STATUS_FILTERS.len();
                vec![Command::LoadOverview]
            }
            _ => vec![],
        }
    }

    fn handle_log_key(&mut self, key: KeyCode) -> Vec<Command> {
        match key {
            KeyCode::Char('h') | KeyCode::Esc | KeyCode::Char('L') => {
                self.view = self.previous_view;
                vec![]
            }
            _ => vec![],
        }
    }

    fn move_cursor(&mut self, delta: i64) {
        let Some(overview) = &self.overview else { return };
        let len = overview.sessions.len();
        if len == 0 {
            return;
        }
        let next = self.cursor as i64 + delta;
        self.cursor = next.clamp(0, len as i64 - 1) as usize;
        self.recompute_scroll();
    }

    fn drill(&mut self) -> Vec<Command> {
        let Some(id) = self.current_session_id() else { return vec![] };
        self.previous_view = self.view;
        self.view = View::Session;
        vec![
            Command::LoadSession { id: id.clone(), keep_ui: false },
            Command::LoadAnalytics { id },
        ]
    }

    fn clamp_message_cursor(&mut self) {
        if let Some(detail) = &self.session_detail {
            let last = detail.messages.len().saturating_sub(1);
            self.message_cursor = self.message_cursor.min(last);
        }
        self.recompute_message_scroll();
    }

    fn recompute_scroll(&mut self) {
        let total = self.overview.as_ref().map(|o| o.sessions.len()).unwrap_or(0);
        let (_, _, offset) = stable_scroll(total, self.cursor, self.session_window(), self.scroll_offset);
        self.scroll_offset = offset;
    }

    fn recompute_message_scroll(&mut self) {
        let total = self.session_detail.as_ref().map(|d| d.messages.len()).unwrap_or(0);
        let (_, _, offset) =
            stable_scroll(total, self.message_cursor, self.session_window(), self.message_scroll_offset);
        self.message_scroll_offset = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelCost, Status, SessionSummary};
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap};

    fn session(id: &str) -> SessionSummary {
        SessionSummary {
            id: id.to_string(),
            label: id.to_string(),
            model: "claude-4.5-sonnet".into(),
            project: None,
            agent_name: None,
            status: Status::Completed,
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration_ns: 0,
            input_tokens: 0,
            output_tokens: 0,
            input_cost: 0.0,
            output_cost: 0.0,
            total_cost: 0.0,
            tool_calls: 0,
            message_count: 1,
            session_count: 1,
            models: vec![ModelCost::default()],
            tool_usage: BTreeMap::new(),
        }
    }

    fn overview(ids: &[&str]) -> Overview {
        Overview {
            sessions: ids.iter().map(|id| session(id)).collect(),
            total_cost: 0.0,
            total_tokens: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_duration_ns: 0,
            total_tool_calls: 0,
            completed: ids.len() as u64,
            failed: 0,
            abandoned: 0,
            unknown: 0,
            success_rate: 100.0,
            cost_by_model: vec![],
        }
    }

    #[test]
    fn overview_loaded_preserves_cursor_on_selected_session() {
        let mut app = App::new(10, LogBuffer::new());
        app.update(Message::OverviewLoaded { overview: Some(overview(&["a", "b", "c"])), err: None });
        app.cursor = 2;
        app.update(Message::OverviewLoaded { overview: Some(overview(&["z", "a", "b", "c"])), err: None });
        assert_eq!(app.cursor, 3); // "c" moved to index 3
    }

    #[test]
    fn overview_loaded_clamps_cursor_when_session_vanishes() {
        let mut app = App::new(10, LogBuffer::new());
        app.update(Message::OverviewLoaded { overview: Some(overview(&["a", "b", "c"])), err: None });
        app.cursor = 2;
        app.update(Message::OverviewLoaded { overview: Some(overview(&["a"])), err: None });
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn replay_tick_stops_at_last_message() {
        let mut app = App::new(10, LogBuffer::new());
        app.replay_on = true;
        app.session_detail = Some(SessionDetail {
            summary: session("s"),
            messages: vec![],
            tool_frequency: HashMap::new(),
            grouped_messages: None,
            sub_sessions: None,
        });
        // zero messages: last index saturates to 0, cursor already there -> stop
        let cmds = app.update(Message::ReplayTick);
        assert!(!app.replay_on);
        assert!(cmds.is_empty());
    }

    #[test]
    fn session_loaded_without_keep_ui_resets_cursor_and_starts_replay() {
        let mut app = App::new(10, LogBuffer::new());
        app.message_cursor = 5;
        app.replay_on_load = true;
        let cmds = app.update(Message::SessionLoaded { detail: None, err: None, keep_ui: false });
        assert_eq!(app.message_cursor, 0);
        assert!(app.replay_on);
        assert!(matches!(cmds.as_slice(), [Command::ScheduleReplayTick]));
    }

    #[test]
    fn refresh_tick_reschedules_only_when_interval_positive() {
        let mut app = App::new(0, LogBuffer::new());
        app.update(Message::OverviewLoaded { overview: Some(overview(&["a"])), err: None });
        let cmds = app.update(Message::RefreshTick);
        assert!(!cmds.iter().any(|c| matches!(c, Command::ScheduleRefreshTick)));
    }

    #[test]
    fn quit_key_emits_quit_command() {
        let mut app = App::new(10, LogBuffer::new());
        let cmds = app.update(Message::Key(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(matches!(cmds.as_slice(), [Command::Quit]));
    }

    #[test]
    fn ctrl_c_emits_quit_command_from_any_view() {
        let mut app = App::new(10, LogBuffer::new());
        app.view = View::Session;
        let cmds = app.update(Message::Key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(matches!(cmds.as_slice(), [Command::Quit]));
    }

    #[test]
    fn log_key_opens_and_closes_log_view() {
        let mut app = App::new(10, LogBuffer::new());
        app.update(Message::Key(KeyCode::Char('L'), KeyModifiers::NONE));
        assert_eq!(app.view, View::Log);
        app.update(Message::Key(KeyCode::Esc, KeyModifiers::NONE));
        assert_eq!(app.view, View::Overview);
    }
}
