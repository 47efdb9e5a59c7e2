//! Session assembler and grouping (spec §4.2).
//!
//! Reconstructs logical sessions from the node store's Merkle DAG: bulk
//! loads nodes, finds leaves, walks each leaf's ancestry chain root-first,
//! derives a `SessionSummary` per chain, and merges related chains into
//! groups by label/agent/project within a one-hour sliding window.
//!
//! No direct teacher analogue exists for this shape of reconstruction; it
//! is written in the teacher's idiom (small focused functions, a
//! `#[cfg(test)]` module with literal scenarios) rather than ported from
//! anywhere in particular.

use crate::model::{ContentBlock, ModelCost, Node, SessionSummary, Status, ToolTally};
use crate::pricing::{calculate_cost, normalize_model, Catalog, TokenUsage};
use crate::store::NodeStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_secs(10);
const GROUP_WINDOW_HOURS: i64 = 1;

/// Reconstructs and caches session summaries. One instance is shared by
/// the query engine across requests.
pub struct Assembler {
    cache: RwLock<Option<(Instant, Vec<SessionSummary>)>>,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(None),
        }
    }

    /// Bulk-load every node, reconstruct every leaf's ancestry chain, and
    /// derive a summary for each. Always re-reads the store; chains whose
    /// summary cannot be built are dropped silently (§4.10).
    pub fn load_sessions(&self, store: &dyn NodeStore, catalog: &Catalog) -> Result<Vec<SessionSummary>> {
        let nodes = store.all_nodes()?;
        let mut by_id: HashMap<&str, &Node> = HashMap::with_capacity(nodes.len());
        let mut has_child: HashSet<&str> = HashSet::new();
        for n in &nodes {
            by_id.insert(n.id.as_str(), n);
            if let Some(parent) = &n.parent_hash {
                has_child.insert(parent.as_str());
            }
        }

        let mut summaries = Vec::new();
        for n in &nodes {
            if has_child.contains(n.id.as_str()) {
                continue;
            }
            let chain = walk_ancestry(&by_id, &n.id);
            if chain.is_empty() {
                continue;
            }
            if let Some(summary) = summarize_chain(&n.id, &chain, catalog) {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// Cached session list: serves a memoized copy for up to ten seconds
    /// unless `bypass` is set. The Overview path always bypasses.
    pub fn sessions(
        &self,
        store: &dyn NodeStore,
        catalog: &Catalog,
        bypass: bool,
    ) -> Result<Vec<SessionSummary>> {
        if !bypass {
            if let Some((at, cached)) = self.cache.read().unwrap().as_ref() {
                if at.elapsed() < CACHE_TTL {
                    return Ok(cached.clone());
                }
            }
        }
        let fresh = self.load_sessions(store, catalog)?;
        *self.cache.write().unwrap() = Some((Instant::now(), fresh.clone()));
        Ok(fresh)
    }

    /// Ancestry chain for an arbitrary node id, root-first. Used by
    /// `SessionDetail` when `session_id` is a plain (non-`group:`) id.
    pub fn chain_from(&self, store: &dyn NodeStore, id: &str) -> Result<Option<Vec<Node>>> {
        if store.get_node(id)?.is_none() {
            return Ok(None);
        }
        let nodes = store.all_nodes()?;
        let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        Ok(Some(walk_ancestry(&by_id, id)))
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

fn walk_ancestry(by_id: &HashMap<&str, &Node>, start_id: &str) -> Vec<Node> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(start_id.to_string());
    while let Some(id) = current {
        if !visited.insert(id.clone()) {
            break;
        }
        let Some(node) = by_id.get(id.as_str()) else {
            break;
        };
        chain.push((*node).clone());
        current = node.parent_hash.clone();
    }
    chain.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    chain
}

pub(crate) fn summarize_chain(leaf_id: &str, chain: &[Node], catalog: &Catalog) -> Option<SessionSummary> {
    let start_time = chain.first()?.created_at;
    let end_time = chain.last()?.created_at;
    let duration_ns = (end_time - start_time).num_nanoseconds().unwrap_or(0).max(0);

    let mut tool_calls = 0u64;
    let mut has_tool_error = false;
    let mut has_git_activity = false;
    let mut model_costs: BTreeMap<String, ModelCost> = BTreeMap::new();
    let mut input_tokens = 0u64;
    let mut output_tokens = 0u64;
    let mut project = None;
    let mut agent_name = None;
    let mut label_lines: Vec<String> = Vec::new();
    let mut first_model: Option<String> = None;
    let mut tool_usage: BTreeMap<String, ToolTally> = BTreeMap::new();

    for node in chain {
        if project.is_none() && node.project.is_some() {
            project = node.project.clone();
        }
        if agent_name.is_none() && node.agent_name.is_some() {
            agent_name = node.agent_name.clone();
        }
        if first_model.is_none() {
            if let Some(m) = &node.model {
                if !m.is_empty() {
                    first_model = Some(m.clone());
                }
            }
        }

        for block in &node.content {
            match block {
                ContentBlock::ToolUse { tool_name, tool_input } => {
                    tool_calls += 1;
                    tool_usage.entry(tool_name.clone()).or_default().count += 1;
                    if tool_name == "Bash" {
                        if let Some(cmd) = tool_input.get("command").and_then(|v| v.as_str()) {
                            let lower = cmd.to_lowercase();
                            if lower.contains("git commit") || lower.contains("git push") {
                                has_git_activity = true;
                            }
                        }
                    }
                }
                ContentBlock::ToolResult { is_error, .. } => {
                    if *is_error {
                        has_tool_error = true;
                    }
                }
                _ => {}
            }
        }

        if node.role == "user" {
            if let Some(line) = extract_label_line(node) {
                label_lines.push(line);
            }
        }

        let usage = TokenUsage {
            input: node.prompt_tokens.unwrap_or(0),
            output: node.completion_tokens.unwrap_or(0),
            cache_creation: node.cache_creation_input_tokens.unwrap_or(0),
            cache_read: node.cache_read_input_tokens.unwrap_or(0),
        };
        input_tokens += usage.input;
        output_tokens += usage.output;

        if let Some(model) = &node.model {
            if !model.is_empty() {
                let tariff = catalog.tariff_for(model);
                let cost = calculate_cost(tariff, usage);
                let key = normalize_model(model);
                let entry = model_costs.entry(key.clone()).or_insert_with(|| ModelCost {
                    model: key,
                    ..Default::default()
                });
                entry.input_tokens += usage.input;
                entry.output_tokens += usage.output;
                entry.input_cost += cost.input_cost;
                entry.output_cost += cost.output_cost;
                entry.total_cost += cost.total_cost;
            }
        }
    }

    for entry in model_costs.values_mut() {
        entry.session_count = 1;
    }
    for tally in tool_usage.values_mut() {
        tally.sessions = 1;
    }

    let terminal = chain.last()?;
    let status = if has_tool_error {
        Status::Failed
    } else if has_git_activity {
        Status::Completed
    } else if terminal.role != "assistant" {
        Status::Abandoned
    } else {
        status_from_stop_reason(terminal.stop_reason.as_deref())
    };

    let dominant_model = model_costs
        .values()
        .max_by(|a, b| a.total_cost.partial_cmp(&b.total_cost).unwrap())
        .map(|m| m.model.clone())
        .or(first_model)
        .unwrap_or_default();

    let recent: Vec<String> = label_lines.iter().rev().take(3).cloned().collect();
    let label = if recent.is_empty() {
        String::new()
    } else {
        crate::util::truncate_chars(&recent.join(" / "), 36)
    };

    let mut models: Vec<ModelCost> = model_costs.into_values().collect();
    models.sort_by(|a, b| b.total_cost.partial_cmp(&a.total_cost).unwrap());

    Some(SessionSummary {
        id: leaf_id.to_string(),
        label,
        model: dominant_model,
        project,
        agent_name,
        status,
        start_time,
        end_time,
        duration_ns,
        input_tokens,
        output_tokens,
        input_cost: models.iter().map(|m| m.input_cost).sum(),
        output_cost: models.iter().map(|m| m.output_cost).sum(),
        total_cost: models.iter().map(|m| m.total_cost).sum(),
        tool_calls,
        message_count: chain.len() as u64,
        session_count: 1,
        models,
        tool_usage,
    })
}

/// Interprets a terminal assistant node's stop reason.
///
/// `tool_use`/`tool_use_response` map to `failed`, preserved as specified
/// rather than treated as a benign mid-conversation pause, for
/// compatibility with the reference behavior this was derived from.
fn status_from_stop_reason(stop_reason: Option<&str>) -> Status {
    let Some(reason) = stop_reason else {
        return Status::Unknown;
    };
    let reason = reason.to_lowercase();
    if reason.is_empty() {
        Status::Unknown
    } else if matches!(reason.as_str(), "stop" | "end_turn" | "end-turn" | "eos") {
        Status::Completed
    } else if matches!(
        reason.as_str(),
        "length" | "max_tokens" | "content_filter" | "tool_use" | "tool_use_response"
    ) {
        Status::Failed
    } else if reason.contains("error") {
        Status::Failed
    } else {
        Status::Unknown
    }
}

fn extract_label_line(node: &Node) -> Option<String> {
    let mut text = String::new();
    for block in &node.content {
        if let ContentBlock::Text { text: t } = block {
            text.push_str(t);
            text.push('\n');
        }
    }
    let stripped = strip_tagged_sections(&text);
    stripped
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty() && !line.starts_with('<') && !line.to_lowercase().starts_with("command:")
        })
        .map(str::to_string)
}

fn strip_tagged_sections(input: &str) -> String {
    let once = remove_between(input, "<system-reminder>", "</system-reminder>");
    remove_between(&once, "<local-command>", "</local-command>")
}

fn remove_between(input: &str, open: &str, close: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(open) {
        result.push_str(&rest[..start]);
        rest = &rest[start + open.len()..];
        match rest.find(close) {
            Some(end) => rest = &rest[end + close.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    result.push_str(rest);
    result
}

/// Result of merging session summaries into groups: the merged summaries
/// plus a map from group id to the member session ids that fed it.
pub struct Grouping {
    pub groups: Vec<SessionSummary>,
    pub members: HashMap<String, Vec<String>>,
}

/// Merge adjacent-in-time sessions sharing a group key within a one-hour
/// window (spec §4.2). Deterministic given a stable input ordering.
pub fn group_sessions(candidates: &[SessionSummary]) -> Grouping {
    let mut sorted: Vec<SessionSummary> = candidates.to_vec();
    sorted.sort_by(|a, b| (a.start_time, a.end_time).cmp(&(b.start_time, b.end_time)));

    let mut groups: Vec<SessionSummary> = Vec::new();
    let mut group_keys: Vec<String> = Vec::new();
    let mut group_models: Vec<BTreeMap<String, ModelCost>> = Vec::new();
    let mut group_tools: Vec<BTreeMap<String, ToolTally>> = Vec::new();
    let mut members: HashMap<String, Vec<String>> = HashMap::new();

    for cand in sorted {
        let key = group_key(&cand);
        let attach_idx = group_keys
            .iter()
            .enumerate()
            .rev()
            .find(|(_, k)| **k == key)
            .map(|(i, _)| i)
            .filter(|&i| cand.start_time - groups[i].end_time <= chrono::Duration::hours(GROUP_WINDOW_HOURS));

        if let Some(idx) = attach_idx {
            let g = &mut groups[idx];
            g.end_time = g.end_time.max(cand.end_time);
            g.duration_ns = (g.end_time - g.start_time).num_nanoseconds().unwrap_or(0).max(0);
            g.input_tokens += cand.input_tokens;
            g.output_tokens += cand.output_tokens;
            g.input_cost += cand.input_cost;
            g.output_cost += cand.output_cost;
            g.total_cost += cand.total_cost;
            g.tool_calls += cand.tool_calls;
            g.message_count += cand.message_count;
            g.session_count += cand.session_count;
            g.status = worse_status(g.status, cand.status);
            merge_model_costs(&mut group_models[idx], &cand.models);
            merge_tool_usage(&mut group_tools[idx], &cand.tool_usage);
            members.get_mut(&g.id).unwrap().push(cand.id.clone());
        } else {
            let gid = group_id(&key, cand.start_time);
            let mut g = cand.clone();
            g.id = gid.clone();
            let mut map = BTreeMap::new();
            merge_model_costs(&mut map, &cand.models);
            group_models.push(map);
            let mut tools = BTreeMap::new();
            merge_tool_usage(&mut tools, &cand.tool_usage);
            group_tools.push(tools);
            groups.push(g);
            group_keys.push(key);
            members.insert(gid, vec![cand.id.clone()]);
        }
    }

    for ((g, models), tools) in groups.iter_mut().zip(group_models.iter()).zip(group_tools.iter()) {
        let mut model_list: Vec<ModelCost> = models.values().cloned().collect();
        model_list.sort_by(|a, b| b.total_cost.partial_cmp(&a.total_cost).unwrap());
        if let Some(top) = model_list.first() {
            g.model = top.model.clone();
        }
        g.models = model_list;
        g.tool_usage = tools.clone();
    }

    Grouping { groups, members }
}

fn worse_status(a: Status, b: Status) -> Status {
    if b.severity() > a.severity() {
        b
    } else {
        a
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

fn merge_tool_usage(into: &mut BTreeMap<String, ToolTally>, from: &BTreeMap<String, ToolTally>) {
    for (name, tally) in from {
        let entry = into.entry(name.clone()).or_default();
        entry.count += tally.count;
        entry.sessions += tally.sessions;
    }
}

fn group_key(summary: &SessionSummary) -> String {
    let label_part: &str = if summary.label.is_empty() {
        &summary.id
    } else {
        &summary.label
    };
    let agent = summary.agent_name.as_deref().unwrap_or("").to_lowercase();
    let project = summary.project.as_deref().unwrap_or("").to_lowercase();
    format!("{}|{}|{}", normalize_key_text(label_part), agent, project)
}

fn normalize_key_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn group_id(key: &str, start: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("group:{}:{}", hex, start.timestamp())
}

/// Splits a synthetic group id into its hash and unix-timestamp parts.
pub fn parse_group_id(id: &str) -> Option<(&str, i64)> {
    let rest = id.strip_prefix("group:")?;
    let (hash, unix) = rest.split_once(':')?;
    Some((hash, unix.parse().ok()?))
}

/// Resolves a session id against the current grouping: exact match first,
/// then (for stale `group:` ids after regrouping) the group sharing the
/// same key hash whose start time is nearest the id's timestamp.
pub fn resolve_group<'a>(id: &str, groups: &'a [SessionSummary]) -> Option<&'a SessionSummary> {
    if let Some(found) = groups.iter().find(|g| g.id == id) {
        return Some(found);
    }
    let (hash, unix) = parse_group_id(id)?;
    groups
        .iter()
        .filter(|g| g.id.split(':').nth(1) == Some(hash))
        .min_by_key(|g| (g.start_time.timestamp() - unix).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn node(id: &str, parent: Option<&str>, role: &str, created_at: i64) -> Node {
        Node {
            id: id.to_string(),
            parent_hash: parent.map(str::to_string),
            role: role.to_string(),
            model: Some("claude-3.5-sonnet".to_string()),
            provider: Some("anthropic".to_string()),
            agent_name: Some("claude-code".to_string()),
            project: Some("deck".to_string()),
            stop_reason: None,
            created_at: Utc.timestamp_opt(created_at, 0).unwrap(),
            content: vec![],
            prompt_tokens: Some(100),
            completion_tokens: Some(50),
            total_tokens: Some(150),
            cache_creation_input_tokens: None,
            cache_read_input_tokens: None,
        }
    }

    #[test]
    fn walk_ancestry_orders_root_first_and_guards_cycles() {
        let mut a = node("a", None, "user", 0);
        let mut b = node("b", Some("a"), "assistant", 1);
        let c = node("c", Some("b"), "user", 2);
        // introduce a cycle: a points back to c
        a.parent_hash = Some("c".to_string());
        b.parent_hash = Some("a".to_string());

        let nodes = vec![a, b, c];
        let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let chain = walk_ancestry(&by_id, "c");
        // cycle guard stops the walk before infinite looping
        assert!(chain.len() <= 3);
    }

    #[test]
    fn status_completed_on_end_turn() {
        let mut n = node("leaf", None, "assistant", 0);
        n.stop_reason = Some("end_turn".to_string());
        assert_eq!(status_from_stop_reason(n.stop_reason.as_deref()), Status::Completed);
    }

    #[test]
    fn status_failed_on_tool_use_stop_reason() {
        // preserved for compatibility: tool_use is treated as failed, not
        // as an intermediate pause.
        assert_eq!(status_from_stop_reason(Some("tool_use")), Status::Failed);
    }

    #[test]
    fn status_unknown_on_empty_stop_reason() {
        assert_eq!(status_from_stop_reason(Some("")), Status::Unknown);
        assert_eq!(status_from_stop_reason(None), Status::Unknown);
    }

    #[test]
    fn label_extraction_strips_system_reminder() {
        let mut n = node("u1", None, "user", 0);
        n.content = vec![ContentBlock::Text {
            text: "<system-reminder>ignore this</system-reminder>\nfix the login bug".to_string(),
        }];
        assert_eq!(extract_label_line(&n).as_deref(), Some("fix the login bug"));
    }

    #[test]
    fn grouping_merges_within_window_and_splits_outside_it() {
        let base = Utc.timestamp_opt(0, 0).unwrap();
        let s1 = SessionSummary {
            id: "s1".into(),
            label: "fix bug".into(),
            model: "claude-3.5-sonnet".into(),
            project: Some("deck".into()),
            agent_name: Some("claude-code".into()),
            status: Status::Completed,
            start_time: base,
            end_time: base + chrono::Duration::minutes(5),
            duration_ns: 0,
            input_tokens: 100,
            output_tokens: 50,
            input_cost: 0.1,
            output_cost: 0.1,
            total_cost: 0.2,
            tool_calls: 1,
            message_count: 2,
            session_count: 1,
            models: vec![],
            tool_usage: BTreeMap::new(),
        };
        let mut s2 = s1.clone();
        s2.id = "s2".into();
        s2.start_time = base + chrono::Duration::minutes(30);
        s2.end_time = base + chrono::Duration::minutes(35);

        let mut s3 = s1.clone();
        s3.id = "s3".into();
        s3.start_time = base + chrono::Duration::hours(3);
        s3.end_time = base + chrono::Duration::hours(3) + chrono::Duration::minutes(5);

        let grouping = group_sessions(&[s1, s2, s3]);
        assert_eq!(grouping.groups.len(), 2);
        let merged = grouping
            .groups
            .iter()
            .find(|g| g.session_count == 2)
            .expect("two sessions merged into one group");
        assert!(merged.id.starts_with("group:"));
        assert_eq!(merged.input_tokens, 200);
    }

    #[test]
    fn parse_and_resolve_group_id_roundtrip() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let id = group_id("fix bug|claude-code|deck", start);
        let (hash, unix) = parse_group_id(&id).unwrap();
        assert_eq!(unix, 1_700_000_000);
        assert_eq!(id, format!("group:{hash}:{unix}"));
    }
}
