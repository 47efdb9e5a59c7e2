//! Query engine (spec §4.3): the read-only surface the HTTP API and TUI
//! both call into. Thin over the assembler — applies filters, sorting,
//! and aggregation, and owns the message-grouping (§4.4) used by session
//! drill-downs.

use crate::assembler::{group_sessions, resolve_group, summarize_chain, Assembler};
use crate::cancel::CancellationToken;
use crate::error::DeckError;
use crate::model::{
    AnalyticsOverview, ContentBlock, DayActivity, Filters, HistogramBucket, ModelCost,
    ModelPerformance, Node, Overview, SessionAnalytics, SessionDetail, SessionMessage,
    SessionMessageGroup, SessionSummary, SortDir, SortKey, Status, ToolUsage,
};
use crate::pricing::{calculate_cost, normalize_model, Catalog, TokenUsage};
use crate::store::NodeStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct QueryEngine {
    store: Arc<dyn NodeStore>,
    catalog: Catalog,
    assembler: Assembler,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn NodeStore>, catalog: Catalog) -> Self {
        Self {
            store,
            catalog,
            assembler: Assembler::new(),
        }
    }

    /// Filtered, sorted list of sessions with aggregate totals. Always
    /// rebuilds the candidate list from a fresh read (§4.2, §5 ordering
    /// guarantees).
    pub fn overview(&self, filters: &Filters, cancel: &CancellationToken) -> Result<Overview> {
        if cancel.is_cancelled() {
            return Err(DeckError::Cancelled.into());
        }
        let candidates = self.assembler.sessions(self.store.as_ref(), &self.catalog, true)?;
        let grouping = group_sessions(&candidates);
        let now = Utc::now();

        let mut sessions: Vec<SessionSummary> = grouping
            .groups
            .into_iter()
            .filter(|s| matches_filters(s, filters, now))
            .collect();
        sort_sessions(&mut sessions, filters.sort, filters.sort_dir);

        let mut total_cost = 0.0;
        let mut total_input_tokens = 0u64;
        let mut total_output_tokens = 0u64;
        let mut total_duration_ns = 0i64;
        let mut total_tool_calls = 0u64;
        let mut completed = 0u64;
        let mut failed = 0u64;
        let mut abandoned = 0u64;
        let mut unknown = 0u64;
        let mut model_costs: BTreeMap<String, ModelCost> = BTreeMap::new();

        for s in &sessions {
            total_cost += s.total_cost;
            total_input_tokens += s.input_tokens;
            total_output_tokens += s.output_tokens;
            total_duration_ns += s.duration_ns;
            total_tool_calls += s.tool_calls;
            match s.status {
                Status::Completed => completed += 1,
                Status::Failed => failed += 1,
                Status::Abandoned => abandoned += 1,
                Status::Unknown => unknown += 1,
            }
            merge_model_costs(&mut model_costs, &s.models);
        }

        let total = sessions.len() as u64;
        let success_rate = if total == 0 { 0.0 } else { completed as f64 / total as f64 };
        let mut cost_by_model: Vec<ModelCost> = model_costs.into_values().collect();
        cost_by_model.sort_by(|a, b| b.total_cost.partial_cmp(&a.total_cost).unwrap());

        Ok(Overview {
            sessions,
            total_cost,
            total_tokens: total_input_tokens + total_output_tokens,
            total_input_tokens,
            total_output_tokens,
            total_duration_ns,
            total_tool_calls,
            completed,
            failed,
            abandoned,
            unknown,
            success_rate,
            cost_by_model,
        })
    }

    /// Full drill-down for a session or group id.
    pub fn session_detail(&self, session_id: &str, cancel: &CancellationToken) -> Result<SessionDetail> {
        if cancel.is_cancelled() {
            return Err(DeckError::Cancelled.into());
        }
        if let Some(group_id) = session_id.strip_prefix("group:").map(|_| session_id) {
            let candidates = self.assembler.sessions(self.store.as_ref(), &self.catalog, false)?;
            let grouping = group_sessions(&candidates);
            let group = resolve_group(group_id, &grouping.groups)
                .ok_or_else(|| DeckError::GroupNotFound(group_id.to_string()))?
                .clone();
            let member_ids = grouping.members.get(&group.id).cloned().unwrap_or_default();

            let sub_sessions: Vec<SessionSummary> = candidates
                .into_iter()
                .filter(|c| member_ids.contains(&c.id))
                .collect();

            let mut nodes: Vec<Node> = Vec::new();
            for member_id in &member_ids {
                if let Some(chain) = self.assembler.chain_from(self.store.as_ref(), member_id)? {
                    nodes.extend(chain);
                }
            }
            nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

            let (messages, tool_frequency) = build_messages(&nodes, &self.catalog);
            let grouped_messages = Some(group_messages(&messages));

            Ok(SessionDetail {
                summary: group,
                messages,
                tool_frequency,
                grouped_messages,
                sub_sessions: Some(sub_sessions),
            })
        } else {
            let chain = self
                .assembler
                .chain_from(self.store.as_ref(), session_id)?
                .ok_or_else(|| DeckError::GroupNotFound(session_id.to_string()))?;
            let summary = summarize_chain(session_id, &chain, &self.catalog)
                .ok_or_else(|| DeckError::DataMalformed(session_id.to_string()))?;
            let (messages, tool_frequency) = build_messages(&chain, &self.catalog);
            let grouped_messages = Some(group_messages(&messages));

            Ok(SessionDetail {
                summary,
                messages,
                tool_frequency,
                grouped_messages,
                sub_sessions: None,
            })
        }
    }

    /// Cross-session rollups: activity by day, tool usage, histograms,
    /// per-model performance, provider breakdown.
    pub fn analytics_overview(&self, filters: &Filters, cancel: &CancellationToken) -> Result<AnalyticsOverview> {
        if cancel.is_cancelled() {
            return Err(DeckError::Cancelled.into());
        }
        let candidates = self.assembler.sessions(self.store.as_ref(), &self.catalog, false)?;
        let grouping = group_sessions(&candidates);
        let now = Utc::now();
        let sessions: Vec<SessionSummary> = grouping
            .groups
            .into_iter()
            .filter(|s| matches_filters(s, filters, now))
            .collect();

        let total_sessions = sessions.len() as u64;
        let total_cost: f64 = sessions.iter().map(|s| s.total_cost).sum();
        let total_tokens: u64 = sessions.iter().map(|s| s.input_tokens + s.output_tokens).sum();
        let avg_session_cost = if total_sessions == 0 { 0.0 } else { total_cost / total_sessions as f64 };
        let avg_duration_ns = if total_sessions == 0 {
            0
        } else {
            sessions.iter().map(|s| s.duration_ns).sum::<i64>() / total_sessions as i64
        };

        let top_tools = top_tools(&sessions);
        let activity_by_day = activity_by_day(&sessions, now);
        let duration_histogram = duration_histogram(&sessions);
        let cost_histogram = cost_histogram(&sessions);
        let model_performance = model_performance(&sessions);
        let by_provider = by_provider(&sessions);

        Ok(AnalyticsOverview {
            total_sessions,
            avg_session_cost,
            avg_duration_ns,
            top_tools,
            activity_by_day,
            duration_histogram,
            cost_histogram,
            model_performance,
            by_provider,
            total_cost,
            total_tokens,
        })
    }

    /// Derived statistics for one session or group, not carried on the
    /// summary itself.
    pub fn session_analytics(&self, session_id: &str, cancel: &CancellationToken) -> Result<SessionAnalytics> {
        if cancel.is_cancelled() {
            return Err(DeckError::Cancelled.into());
        }
        let detail = self.session_detail(session_id, cancel)?;
        let messages = &detail.messages;

        let user_message_count = messages.iter().filter(|m| m.role == "user").count() as u64;
        let assistant_message_count = messages.iter().filter(|m| m.role == "assistant").count() as u64;

        let assistant_deltas: Vec<i64> = messages
            .iter()
            .filter(|m| m.role == "assistant")
            .map(|m| m.delta_ns)
            .collect();
        let avg_response_time_ns = mean_i64(&assistant_deltas);
        let longest_pause_ns = messages.iter().map(|m| m.delta_ns).max().unwrap_or(0);

        let unique_tools = detail.tool_frequency.len() as u64;
        let tool_error_count = count_tool_errors(messages);

        let duration_minutes = (detail.summary.duration_ns as f64 / 1_000_000_000.0 / 60.0).max(1.0 / 60.0);
        let total_tokens: u64 = messages.iter().map(|m| m.total_tokens).sum();
        let tokens_per_minute = total_tokens as f64 / duration_minutes;

        let user_lengths: Vec<f64> = messages
            .iter()
            .filter(|m| m.role == "user")
            .map(|m| m.text.chars().count() as f64)
            .collect();
        let assistant_lengths: Vec<f64> = messages
            .iter()
            .filter(|m| m.role == "assistant")
            .map(|m| m.text.chars().count() as f64)
            .collect();
        let avg_prompt_length = mean_f64(&user_lengths);
        let avg_response_length = mean_f64(&assistant_lengths);

        let first_prompt = messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| crate::util::truncate_chars(&m.text, 200))
            .unwrap_or_default();

        Ok(SessionAnalytics {
            session_id: session_id.to_string(),
            user_message_count,
            assistant_message_count,
            avg_response_time_ns,
            longest_pause_ns,
            unique_tools,
            tool_error_count,
            tokens_per_minute,
            avg_prompt_length,
            avg_response_length,
            first_prompt,
        })
    }
}

fn matches_filters(summary: &SessionSummary, filters: &Filters, now: DateTime<Utc>) -> bool {
    if let Some(model) = &filters.model {
        if normalize_model(&summary.model) != normalize_model(model) {
            return false;
        }
    }
    if let Some(status) = &filters.status {
        if summary.status.as_str() != status.to_lowercase() {
            return false;
        }
    }
    if let Some(project) = &filters.project {
        if summary.project.as_deref() != Some(project.as_str()) {
            return false;
        }
    }
    if let Some(session) = &filters.session {
        if &summary.id != session {
            return false;
        }
    }
    if let Some(from) = filters.from {
        if summary.end_time < from {
            return false;
        }
    }
    if let Some(to) = filters.to {
        if summary.start_time > to {
            return false;
        }
    }
    if let Some(since) = filters.since {
        if since > Duration::zero() && summary.end_time < now - since {
            return false;
        }
    }
    true
}

fn sort_sessions(sessions: &mut [SessionSummary], sort: SortKey, dir: SortDir) {
    sessions.sort_by(|a, b| match sort {
        SortKey::Cost => a.total_cost.partial_cmp(&b.total_cost).unwrap(),
        SortKey::Date => a.start_time.cmp(&b.start_time),
        SortKey::Tokens => (a.input_tokens + a.output_tokens).cmp(&(b.input_tokens + b.output_tokens)),
        SortKey::Duration => a.duration_ns.cmp(&b.duration_ns),
    });
    if dir == SortDir::Desc {
        sessions.reverse();
    }
}

fn merge_model_costs(into: &mut BTreeMap<String, ModelCost>, from: &[ModelCost]) {
    for m in from {
        let entry = into.entry(m.model.clone()).or_insert_with(|| ModelCost {
            model: m.model.clone(),
            ..Default::default()
        });
        entry.input_tokens += m.input_tokens;
        entry.output_tokens += m.output_tokens;
        entry.input_cost += m.input_cost;
        entry.output_cost += m.output_cost;
        entry.total_cost += m.total_cost;
        entry.session_count += m.session_count;
    }
}

fn build_messages(chain: &[Node], catalog: &Catalog) -> (Vec<SessionMessage>, HashMap<String, u64>) {
    let mut messages = Vec::with_capacity(chain.len());
    let mut tool_frequency: HashMap<String, u64> = HashMap::new();
    let mut prev_time: Option<DateTime<Utc>> = None;

    for node in chain {
        let delta_ns = match prev_time {
            Some(prev) => (node.created_at - prev).num_nanoseconds().unwrap_or(0).max(0),
            None => 0,
        };
        prev_time = Some(node.created_at);

        let mut tool_calls = Vec::new();
        let mut text_parts = Vec::new();
        let mut tool_error_count = 0u64;
        for block in &node.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text.clone()),
                ContentBlock::ToolUse { tool_name, .. } => {
                    tool_calls.push(tool_name.clone());
                    *tool_frequency.entry(tool_name.clone()).or_insert(0) += 1;
                }
                ContentBlock::ToolResult { tool_output, is_error } => {
                    text_parts.push(tool_output.clone());
                    if *is_error {
                        tool_error_count += 1;
                    }
                }
                ContentBlock::Other => {}
            }
        }
        let text = text_parts.join("\n");

        let usage = TokenUsage {
            input: node.prompt_tokens.unwrap_or(0),
            output: node.completion_tokens.unwrap_or(0),
            cache_creation: node.cache_creation_input_tokens.unwrap_or(0),
            cache_read: node.cache_read_input_tokens.unwrap_or(0),
        };
        let cost = node
            .model
            .as_deref()
            .map(|m| calculate_cost(catalog.tariff_for(m), usage))
            .unwrap_or_default();

        messages.push(SessionMessage {
            hash: node.id.clone(),
            role: node.role.clone(),
            model: node.model.clone(),
            timestamp: node.created_at,
            delta_ns,
            input_tokens: usage.input,
            output_tokens: usage.output,
            total_tokens: node.total_tokens.unwrap_or(usage.input + usage.output),
            input_cost: cost.input_cost,
            output_cost: cost.output_cost,
            total_cost: cost.total_cost,
            tool_calls,
            tool_error_count,
            text,
        });
    }

    (messages, tool_frequency)
}

const MESSAGE_GROUP_GAP: Duration = Duration::seconds(5);
const MESSAGE_GROUP_TEXT_LIMIT: usize = 4000;

fn group_messages(messages: &[SessionMessage]) -> Vec<SessionMessageGroup> {
    let mut groups: Vec<SessionMessageGroup> = Vec::new();

    for (i, msg) in messages.iter().enumerate() {
        let attaches = groups
            .last()
            .map(|g| g.role == msg.role && msg.timestamp - g.end_time <= MESSAGE_GROUP_GAP)
            .unwrap_or(false);

        if attaches {
            let g = groups.last_mut().unwrap();
            g.end_time = msg.timestamp;
            if !msg.text.is_empty() {
                if !g.text.is_empty() {
                    g.text.push_str("\n\n");
                }
                g.text.push_str(&msg.text);
            }
            for t in &msg.tool_calls {
                if !g.tool_calls.contains(t) {
                    g.tool_calls.push(t.clone());
                }
            }
            g.message_indices.push(i);
        } else {
            let delta_ns = groups
                .last()
                .map(|g| (msg.timestamp - g.end_time).num_nanoseconds().unwrap_or(0).max(0))
                .unwrap_or(0);
            groups.push(SessionMessageGroup {
                role: msg.role.clone(),
                start_time: msg.timestamp,
                end_time: msg.timestamp,
                delta_ns,
                text: msg.text.clone(),
                tool_calls: msg.tool_calls.clone(),
                message_indices: vec![i],
            });
        }
    }

    for g in &mut groups {
        g.text = crate::util::truncate_chars(&g.text, MESSAGE_GROUP_TEXT_LIMIT);
    }
    groups
}

const TOP_TOOLS_LIMIT: usize = 15;

fn top_tools(sessions: &[SessionSummary]) -> Vec<ToolUsage> {
    let mut by_name: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for s in sessions {
        for (name, tally) in &s.tool_usage {
            let entry = by_name.entry(name.clone()).or_insert((0, 0));
            entry.0 += tally.count;
            entry.1 += tally.sessions;
        }
    }

    // Per-tool error correlation isn't available (see `ToolTally`'s doc
    // comment): error_count stays zero here.
    let mut tools: Vec<ToolUsage> = by_name
        .into_iter()
        .map(|(name, (count, sessions))| ToolUsage {
            name,
            count,
            error_count: 0,
            sessions,
        })
        .collect();
    tools.sort_by(|a, b| b.count.cmp(&a.count));
    tools.truncate(TOP_TOOLS_LIMIT);
    tools
}

fn activity_by_day(sessions: &[SessionSummary], now: DateTime<Utc>) -> Vec<DayActivity> {
    let mut by_day: BTreeMap<String, (u64, f64)> = BTreeMap::new();
    for s in sessions {
        let key = s.start_time.format("%Y-%m-%d").to_string();
        let entry = by_day.entry(key).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += s.total_cost;
    }

    let mut days = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let date = (now - Duration::days(offset)).format("%Y-%m-%d").to_string();
        let (session_count, total_cost) = by_day.get(&date).cloned().unwrap_or((0, 0.0));
        days.push(DayActivity {
            date,
            session_count,
            total_cost,
        });
    }
    days
}

fn duration_histogram(sessions: &[SessionSummary]) -> Vec<HistogramBucket> {
    const LABELS: [&str; 6] = ["<1m", "1-5m", "5-15m", "15-30m", "30-60m", ">1h"];
    let mut counts = [0u64; 6];
    for s in sessions {
        let minutes = s.duration_ns as f64 / 1_000_000_000.0 / 60.0;
        let idx = if minutes < 1.0 {
            0
        } else if minutes < 5.0 {
            1
        } else if minutes < 15.0 {
            2
        } else if minutes < 30.0 {
            3
        } else if minutes < 60.0 {
            4
        } else {
            5
        };
        counts[idx] += 1;
    }
    LABELS
        .iter()
        .zip(counts.iter())
        .map(|(label, count)| HistogramBucket {
            label: label.to_string(),
            count: *count,
        })
        .collect()
}

fn cost_histogram(sessions: &[SessionSummary]) -> Vec<HistogramBucket> {
    const LABELS: [&str; 6] = ["<$0.01", "$0.01-0.10", "$0.10-0.50", "$0.50-1.00", "$1.00-5.00", ">$5.00"];
    let mut counts = [0u64; 6];
    for s in sessions {
        let idx = if s.total_cost < 0.01 {
            0
        } else if s.total_cost < 0.10 {
            1
        } else if s.total_cost < 0.50 {
            2
        } else if s.total_cost < 1.00 {
            3
        } else if s.total_cost < 5.00 {
            4
        } else {
            5
        };
        counts[idx] += 1;
    }
    LABELS
        .iter()
        .zip(counts.iter())
        .map(|(label, count)| HistogramBucket {
            label: label.to_string(),
            count: *count,
        })
        .collect()
}

fn model_performance(sessions: &[SessionSummary]) -> Vec<ModelPerformance> {
    struct Acc {
        sessions: u64,
        total_cost: f64,
        total_duration_ns: i64,
        total_tokens: u64,
        completed_count: u64,
    }

    let mut by_model: BTreeMap<String, Acc> = BTreeMap::new();
    for s in sessions {
        let entry = by_model.entry(s.model.clone()).or_insert(Acc {
            sessions: 0,
            total_cost: 0.0,
            total_duration_ns: 0,
            total_tokens: 0,
            completed_count: 0,
        });
        entry.sessions += 1;
        entry.total_cost += s.total_cost;
        entry.total_duration_ns += s.duration_ns;
        entry.total_tokens += s.input_tokens + s.output_tokens;
        if s.status == Status::Completed {
            entry.completed_count += 1;
        }
    }

    let mut rows: Vec<ModelPerformance> = by_model
        .into_iter()
        .map(|(model, acc)| ModelPerformance {
            model,
            sessions: acc.sessions,
            avg_cost: acc.total_cost / acc.sessions as f64,
            avg_duration_ns: acc.total_duration_ns / acc.sessions as i64,
            avg_tokens: acc.total_tokens as f64 / acc.sessions as f64,
            total_cost: acc.total_cost,
            success_rate: acc.completed_count as f64 / acc.sessions as f64,
            completed_count: acc.completed_count,
        })
        .collect();
    rows.sort_by(|a, b| b.total_cost.partial_cmp(&a.total_cost).unwrap());
    rows
}

fn by_provider(sessions: &[SessionSummary]) -> HashMap<String, u64> {
    // Provider isn't carried on `SessionSummary` directly; approximate
    // from the dominant model's provider family.
    let mut counts: HashMap<String, u64> = HashMap::new();
    for s in sessions {
        let provider = if s.model.starts_with("claude") {
            "anthropic"
        } else if s.model.starts_with("gpt") {
            "openai"
        } else {
            "unknown"
        };
        *counts.entry(provider.to_string()).or_insert(0) += s.message_count;
    }
    counts
}

fn count_tool_errors(messages: &[SessionMessage]) -> u64 {
    messages.iter().map(|m| m.tool_error_count).sum()
}

fn mean_i64(values: &[i64]) -> i64 {
    if values.is_empty() {
        0
    } else {
        values.iter().sum::<i64>() / values.len() as i64
    }
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn summary(id: &str, model: &str, status: Status, cost: f64) -> SessionSummary {
        SessionSummary {
            id: id.to_string(),
            label: id.to_string(),
            model: model.to_string(),
            project: None,
            agent_name: None,
            status,
            start_time: Utc::now() - Duration::hours(1),
            end_time: Utc::now(),
            duration_ns: 1_000_000_000,
            input_tokens: 100,
            output_tokens: 200,
            input_cost: cost / 2.0,
            output_cost: cost / 2.0,
            total_cost: cost,
            tool_calls: 1,
            message_count: 2,
            session_count: 1,
            models: vec![],
            tool_usage: BTreeMap::new(),
        }
    }

    #[test]
    fn matches_filters_applies_status_and_model() {
        let now = Utc::now();
        let s = summary("a", "claude-4.5-sonnet", Status::Completed, 1.0);
        let mut filters = Filters { model: Some("claude-4.5-sonnet".to_string()), ..Default::default() };
        assert!(matches_filters(&s, &filters, now));

        filters.status = Some("failed".to_string());
        assert!(!matches_filters(&s, &filters, now));
    }

    #[test]
    fn matches_filters_since_excludes_stale_sessions() {
        let now = Utc::now();
        let mut stale = summary("a", "claude-4.5-sonnet", Status::Completed, 1.0);
        stale.end_time = now - Duration::days(10);
        let filters = Filters { since: Some(Duration::days(1)), ..Default::default() };
        assert!(!matches_filters(&stale, &filters, now));
    }

    #[test]
    fn sort_sessions_by_cost_descending() {
        let mut sessions =
            vec![summary("a", "m", Status::Completed, 1.0), summary("b", "m", Status::Completed, 5.0)];
        sort_sessions(&mut sessions, SortKey::Cost, SortDir::Desc);
        assert_eq!(sessions[0].id, "b");
    }

    #[test]
    fn sort_sessions_by_date_ascending() {
        let mut older = summary("old", "m", Status::Completed, 1.0);
        older.start_time = Utc::now() - Duration::days(5);
        let newer = summary("new", "m", Status::Completed, 1.0);
        let mut sessions = vec![newer, older];
        sort_sessions(&mut sessions, SortKey::Date, SortDir::Asc);
        assert_eq!(sessions[0].id, "old");
    }

    #[test]
    fn merge_model_costs_accumulates_across_sessions() {
        let mut into = BTreeMap::new();
        merge_model_costs(&mut into, &[ModelCost { model: "m".into(), total_cost: 1.0, session_count: 1, ..Default::default() }]);
        merge_model_costs(&mut into, &[ModelCost { model: "m".into(), total_cost: 2.0, session_count: 1, ..Default::default() }]);
        assert_eq!(into["m"].total_cost, 3.0);
        assert_eq!(into["m"].session_count, 2);
    }
}
