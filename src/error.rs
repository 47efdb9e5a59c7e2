//! Typed error kinds for the core engine (spec §7).
//!
//! Application glue (`main.rs`, `cli.rs`, config loading) uses
//! `anyhow::Result` instead — these variants exist so callers that need to
//! branch on error *kind* (HTTP handlers deciding 400 vs 500, the facet
//! worker deciding whether to keep going) can match rather than string-sniff.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("node store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("session data malformed: {0}")]
    DataMalformed(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("LLM call failed: {0}")]
    LlmTransport(String),

    #[error("LLM response malformed: {0}")]
    LlmMalformed(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DeckError>;
