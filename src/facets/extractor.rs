//! Facet extraction (spec §4.5): renders a session transcript, prompts an
//! LLM for closed-set qualitative metadata, and upserts the result.

use super::llm::LlmCaller;
use crate::cancel::CancellationToken;
use crate::error::DeckError;
use crate::model::{
    SessionFacet, SessionMessage, FRICTION_TYPES, GOAL_CATEGORIES, OUTCOMES, SESSION_TYPES,
};
use crate::query::QueryEngine;
use chrono::Utc;
use serde::Deserialize;

const TRANSCRIPT_CHAR_LIMIT: usize = 30_000;

pub struct Extractor<'a> {
    query: &'a QueryEngine,
    caller: &'a LlmCaller,
}

impl<'a> Extractor<'a> {
    pub fn new(query: &'a QueryEngine, caller: &'a LlmCaller) -> Self {
        Self { query, caller }
    }

    /// Produce and persist a `SessionFacet` for `session_id` (spec §4.5).
    pub async fn extract(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SessionFacet, DeckError> {
        let detail = self
            .query
            .session_detail(session_id, cancel)
            .map_err(|e| DeckError::DataMalformed(e.to_string()))?;

        let transcript = render_transcript(&detail.messages);
        let prompt = build_prompt(&transcript);
        let raw = self.caller.call(&prompt).await?;
        let parsed = parse_tolerant(&raw)?;

        Ok(SessionFacet {
            session_id: session_id.to_string(),
            underlying_goal: parsed.underlying_goal,
            goal_category: parsed.goal_category,
            outcome: parsed.outcome,
            session_type: parsed.session_type,
            friction_types: parsed.friction_types,
            brief_summary: parsed.brief_summary,
            extracted_at: Utc::now(),
        })
    }
}

fn render_transcript(messages: &[SessionMessage]) -> String {
    let mut out = String::new();
    for m in messages {
        out.push('[');
        out.push_str(&m.role);
        out.push_str("] ");
        out.push_str(&m.text);
        out.push('\n');
    }
    crate::util::truncate_chars(&out, TRANSCRIPT_CHAR_LIMIT)
}

fn build_prompt(transcript: &str) -> String {
    format!(
        "You are analyzing a coding agent session transcript. Read it and respond with \
         strict JSON only (no markdown fences), with exactly these keys:\n\
         - underlying_goal: a short free-text description of what the user was trying to \
         accomplish\n\
         - goal_category: one of {goal_categories:?}\n\
         - outcome: one of {outcomes:?}\n\
         - session_type: one of {session_types:?}\n\
         - friction_types: a JSON array of zero or more of {friction_types:?}\n\
         - brief_summary: one or two sentences summarizing what happened\n\n\
         Transcript:\n{transcript}",
        goal_categories = GOAL_CATEGORIES,
        outcomes = OUTCOMES,
        session_types = SESSION_TYPES,
        friction_types = FRICTION_TYPES,
        transcript = transcript,
    )
}

#[derive(Debug, Deserialize)]
struct ParsedFacet {
    underlying_goal: String,
    goal_category: String,
    outcome: String,
    session_type: String,
    #[serde(default)]
    friction_types: Vec<String>,
    brief_summary: String,
}

/// Locates the first `{` and last `}` in `raw` and decodes the slice
/// between them, tolerating responses wrapped in markdown fences or
/// leading/trailing prose.
fn parse_tolerant(raw: &str) -> Result<ParsedFacet, DeckError> {
    let start = raw
        .find('{')
        .ok_or_else(|| DeckError::LlmMalformed("no '{' found in response".into()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| DeckError::LlmMalformed("no '}' found in response".into()))?;
    if end < start {
        return Err(DeckError::LlmMalformed("'}' precedes '{' in response".into()));
    }
    let slice = &raw[start..=end];
    serde_json::from_str(slice)
        .map_err(|e| DeckError::LlmMalformed(format!("invalid facet JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_facet_wrapped_in_markdown_fence() {
        let raw = "```json\n{\"underlying_goal\":\"fix login\",\"goal_category\":\"bug-fix\",\
                   \"outcome\":\"success\",\"session_type\":\"interactive\",\
                   \"friction_types\":[\"tool-errors\"],\"brief_summary\":\"fixed it\"}\n```";
        let parsed = parse_tolerant(raw).unwrap();
        assert_eq!(parsed.goal_category, "bug-fix");
        assert_eq!(parsed.friction_types, vec!["tool-errors".to_string()]);
    }

    #[test]
    fn rejects_response_with_no_braces() {
        assert!(parse_tolerant("no json here").is_err());
    }

    #[test]
    fn transcript_truncates_past_limit() {
        let messages = vec![SessionMessage {
            hash: "m1".into(),
            role: "user".into(),
            model: None,
            timestamp: Utc::now(),
            delta_ns: 0,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            input_cost: 0.0,
            output_cost: 0.0,
            total_cost: 0.0,
            tool_calls: vec![],
            tool_error_count: 0,
            text: "x".repeat(40_000),
        }];
        let transcript = render_transcript(&messages);
        assert!(transcript.chars().count() <= TRANSCRIPT_CHAR_LIMIT);
    }
}
