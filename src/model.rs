//! Core data types for the session assembler, query engine, and facet
//! pipeline. These are DTOs: derivation logic lives in `assembler`,
//! `query`, and `facets`, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A single message in a session, as produced by the ingesting proxy and
/// read back from the node store. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub parent_hash: Option<String>,
    pub role: String,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub agent_name: Option<String>,
    pub project: Option<String>,
    pub stop_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub content: Vec<ContentBlock>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cache_creation_input_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
}

/// One block of a node's content. Kept as an open enum with an `Other`
/// variant so unrecognized block types don't fail the whole node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        tool_name: String,
        tool_input: serde_json::Value,
    },
    ToolResult {
        tool_output: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

/// Per-model cost/token rollup within a session or group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCost {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub session_count: u64,
}

/// Per-tool call tally within a session or group. Error correlation isn't
/// tracked here: a `ToolResult` block doesn't carry the originating tool's
/// name, so per-tool error counts aren't derivable from this data model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToolTally {
    pub count: u64,
    pub sessions: u64,
}

/// Derived status of a session, computed solely from content blocks and
/// the terminal node (spec §4.2) — never from external metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Completed,
    Failed,
    Abandoned,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Abandoned => "abandoned",
            Status::Unknown => "unknown",
        }
    }

    /// Worst-of ordering used when merging sessions into a group:
    /// failed > abandoned > completed > unknown.
    pub fn severity(&self) -> u8 {
        match self {
            Status::Failed => 3,
            Status::Abandoned => 2,
            Status::Completed => 1,
            Status::Unknown => 0,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one ancestry chain (a "session") or one merged `SessionGroup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub label: String,
    pub model: String,
    pub project: Option<String>,
    pub agent_name: Option<String>,
    pub status: Status,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ns: i64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub tool_calls: u64,
    pub message_count: u64,
    pub session_count: u64,
    #[serde(default)]
    pub models: Vec<ModelCost>,
    #[serde(default)]
    pub tool_usage: BTreeMap<String, ToolTally>,
}

/// One message inside a `SessionDetail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub hash: String,
    pub role: String,
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub delta_ns: i64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub tool_calls: Vec<String>,
    pub tool_error_count: u64,
    pub text: String,
}

/// Adjacent same-role messages within five seconds of each other (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessageGroup {
    pub role: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub delta_ns: i64,
    pub text: String,
    pub tool_calls: Vec<String>,
    pub message_indices: Vec<usize>,
}

/// Full drill-down view for one session or group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    pub summary: SessionSummary,
    pub messages: Vec<SessionMessage>,
    pub tool_frequency: HashMap<String, u64>,
    #[serde(default)]
    pub grouped_messages: Option<Vec<SessionMessageGroup>>,
    #[serde(default)]
    pub sub_sessions: Option<Vec<SessionSummary>>,
}

/// Filtered list of sessions plus aggregate totals (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub sessions: Vec<SessionSummary>,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ns: i64,
    pub total_tool_calls: u64,
    pub completed: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub unknown: u64,
    pub success_rate: f64,
    pub cost_by_model: Vec<ModelCost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayActivity {
    pub date: String,
    pub session_count: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsage {
    pub name: String,
    pub count: u64,
    pub error_count: u64,
    pub sessions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub model: String,
    pub sessions: u64,
    pub avg_cost: f64,
    pub avg_duration_ns: i64,
    pub avg_tokens: f64,
    pub total_cost: f64,
    pub success_rate: f64,
    pub completed_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsOverview {
    pub total_sessions: u64,
    pub avg_session_cost: f64,
    pub avg_duration_ns: i64,
    pub top_tools: Vec<ToolUsage>,
    pub activity_by_day: Vec<DayActivity>,
    pub duration_histogram: Vec<HistogramBucket>,
    pub cost_histogram: Vec<HistogramBucket>,
    pub model_performance: Vec<ModelPerformance>,
    pub by_provider: HashMap<String, u64>,
    pub total_cost: f64,
    pub total_tokens: u64,
}

/// Per-session derived statistics not carried by `SessionSummary` (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub session_id: String,
    pub user_message_count: u64,
    pub assistant_message_count: u64,
    pub avg_response_time_ns: i64,
    pub longest_pause_ns: i64,
    pub unique_tools: u64,
    pub tool_error_count: u64,
    pub tokens_per_minute: f64,
    pub avg_prompt_length: f64,
    pub avg_response_length: f64,
    pub first_prompt: String,
}

/// Closed sets for the LLM facet-extraction wire contract (spec §4.5, §9).
pub const GOAL_CATEGORIES: &[&str] = &[
    "feature-development",
    "bug-fix",
    "refactoring",
    "debugging",
    "testing",
    "documentation",
    "code-review",
    "exploration",
    "configuration",
    "data-analysis",
    "infrastructure",
    "learning",
    "other",
];

pub const OUTCOMES: &[&str] = &["success", "partial-success", "failure", "abandoned"];

pub const SESSION_TYPES: &[&str] = &["interactive", "autonomous", "supervised", "batch"];

pub const FRICTION_TYPES: &[&str] = &[
    "unclear-requirements",
    "tool-errors",
    "context-loss",
    "repeated-mistakes",
    "environment-issues",
    "scope-creep",
    "api-limits",
];

/// LLM-extracted qualitative metadata for one session (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFacet {
    pub session_id: String,
    pub underlying_goal: String,
    pub goal_category: String,
    pub outcome: String,
    pub session_type: String,
    pub friction_types: Vec<String>,
    pub brief_summary: String,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetCount {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetAnalytics {
    pub by_goal_category: Vec<FacetCount>,
    pub by_outcome: Vec<FacetCount>,
    pub by_session_type: Vec<FacetCount>,
    pub top_friction_types: Vec<FacetCount>,
    pub recent: Vec<SessionFacet>,
}

/// Sort key for `Overview`/`AnalyticsOverview` queries (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Date,
    Cost,
    Tokens,
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

/// Filter/sort parameters accepted by every read operation in `query`.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub since: Option<chrono::Duration>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub status: Option<String>,
    pub project: Option<String>,
    pub session: Option<String>,
    pub sort: SortKey,
    pub sort_dir: SortDir,
}
