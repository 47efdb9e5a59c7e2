//! Node store adapter (spec §6): a read-only facade over the
//! content-addressed store the ingesting proxy writes to, plus the one
//! piece of state this core owns — the facet table.
//!
//! The reference backing is SQLite, queried through a pooled set of
//! read-only connections, the same shape as `CortexQuery` in the teacher
//! repo. Nothing upstream of this module depends on that choice; swap
//! `SqliteNodeStore` for another `NodeStore` impl to back it with
//! something else.

use crate::model::{ContentBlock, Node, SessionFacet};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Capability interface the rest of the core depends on (spec §6).
pub trait NodeStore: Send + Sync {
    fn get_node(&self, id: &str) -> Result<Option<Node>>;
    fn all_nodes(&self) -> Result<Vec<Node>>;
    fn get_facet(&self, session_id: &str) -> Result<Option<SessionFacet>>;
    fn save_facet(&self, facet: &SessionFacet) -> Result<()>;
    fn list_facets(&self) -> Result<Vec<SessionFacet>>;
}

/// SQLite-backed `NodeStore`, read-only over the `nodes` table and
/// read-write over the `facets` table it owns.
pub struct SqliteNodeStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteNodeStore {
    /// Open a pooled connection set against the store at `db_path` and
    /// create the `facets` table if it doesn't already exist.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .context("failed to build sqlite connection pool")?;

        let conn = pool.get().context("node store unavailable")?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .context("node store health check failed")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS facets (
                session_id TEXT PRIMARY KEY,
                underlying_goal TEXT NOT NULL,
                goal_category TEXT NOT NULL,
                outcome TEXT NOT NULL,
                session_type TEXT NOT NULL,
                friction_types TEXT NOT NULL,
                brief_summary TEXT NOT NULL,
                extracted_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("failed to ensure facets table exists")?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("node store unavailable")
    }
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let created_at: String = row.get("created_at")?;
    let content_json: String = row.get("content")?;
    let content: Vec<ContentBlock> = serde_json::from_str(&content_json).unwrap_or_default();

    Ok(Node {
        id: row.get("id")?,
        parent_hash: row.get("parent_hash")?,
        role: row.get("role")?,
        model: row.get("model")?,
        provider: row.get("provider")?,
        agent_name: row.get("agent_name")?,
        project: row.get("project")?,
        stop_reason: row.get("stop_reason")?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
        content,
        prompt_tokens: row.get("prompt_tokens")?,
        completion_tokens: row.get("completion_tokens")?,
        total_tokens: row.get("total_tokens")?,
        cache_creation_input_tokens: row.get("cache_creation_input_tokens")?,
        cache_read_input_tokens: row.get("cache_read_input_tokens")?,
    })
}

const NODE_COLUMNS: &str = "id, parent_hash, role, model, provider, agent_name, project, \
     stop_reason, created_at, content, prompt_tokens, completion_tokens, total_tokens, \
     cache_creation_input_tokens, cache_read_input_tokens";

impl NodeStore for SqliteNodeStore {
    fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let conn = self.conn()?;
        let node = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![id],
                row_to_node,
            )
            .optional()
            .context("failed to read node")?;
        Ok(node)
    }

    fn all_nodes(&self) -> Result<Vec<Node>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes ORDER BY created_at ASC"))
            .context("failed to prepare node scan")?;
        let rows = stmt
            .query_map([], row_to_node)
            .context("failed to scan nodes")?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row.context("failed to decode node row")?);
        }
        Ok(nodes)
    }

    fn get_facet(&self, session_id: &str) -> Result<Option<SessionFacet>> {
        let conn = self.conn()?;
        let facet = conn
            .query_row(
                "SELECT session_id, underlying_goal, goal_category, outcome, session_type, \
                 friction_types, brief_summary, extracted_at FROM facets WHERE session_id = ?1",
                params![session_id],
                row_to_facet,
            )
            .optional()
            .context("failed to read facet")?;
        Ok(facet)
    }

    fn save_facet(&self, facet: &SessionFacet) -> Result<()> {
        let conn = self.conn()?;
        let friction_json = serde_json::to_string(&facet.friction_types)?;
        // Facets are replaced wholesale, never merged: a re-extraction
        // fully supersedes the previous one.
        conn.execute(
            r#"
            INSERT INTO facets (session_id, underlying_goal, goal_category, outcome,
                session_type, friction_types, brief_summary, extracted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(session_id) DO UPDATE SET
                underlying_goal = excluded.underlying_goal,
                goal_category = excluded.goal_category,
                outcome = excluded.outcome,
                session_type = excluded.session_type,
                friction_types = excluded.friction_types,
                brief_summary = excluded.brief_summary,
                extracted_at = excluded.extracted_at
            "#,
            params![
                facet.session_id,
                facet.underlying_goal,
                facet.goal_category,
                facet.outcome,
                facet.session_type,
                friction_json,
                facet.brief_summary,
                facet.extracted_at.to_rfc3339(),
            ],
        )
        .context("failed to save facet")?;
        Ok(())
    }

    fn list_facets(&self) -> Result<Vec<SessionFacet>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, underlying_goal, goal_category, outcome, session_type, \
             friction_types, brief_summary, extracted_at FROM facets ORDER BY extracted_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_facet)?;
        let mut facets = Vec::new();
        for row in rows {
            facets.push(row.context("failed to decode facet row")?);
        }
        Ok(facets)
    }
}

fn row_to_facet(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionFacet> {
    let friction_json: String = row.get("friction_types")?;
    let extracted_at: String = row.get("extracted_at")?;
    Ok(SessionFacet {
        session_id: row.get("session_id")?,
        underlying_goal: row.get("underlying_goal")?,
        goal_category: row.get("goal_category")?,
        outcome: row.get("outcome")?,
        session_type: row.get("session_type")?,
        friction_types: serde_json::from_str(&friction_json).unwrap_or_default(),
        brief_summary: row.get("brief_summary")?,
        extracted_at: extracted_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn fixture() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE nodes (
                id TEXT PRIMARY KEY,
                parent_hash TEXT,
                role TEXT NOT NULL,
                model TEXT,
                provider TEXT,
                agent_name TEXT,
                project TEXT,
                stop_reason TEXT,
                created_at TEXT NOT NULL,
                content TEXT NOT NULL,
                prompt_tokens INTEGER,
                completion_tokens INTEGER,
                total_tokens INTEGER,
                cache_creation_input_tokens INTEGER,
                cache_read_input_tokens INTEGER
            );
            INSERT INTO nodes (id, parent_hash, role, model, provider, agent_name, project,
                stop_reason, created_at, content, prompt_tokens, completion_tokens, total_tokens,
                cache_creation_input_tokens, cache_read_input_tokens)
            VALUES ('n1', NULL, 'user', NULL, NULL, 'claude-code', 'deck',
                NULL, '2026-01-01T00:00:00Z', '[]', NULL, NULL, NULL, NULL, NULL);
            "#,
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn roundtrips_a_node() {
        let (_dir, path) = fixture();
        let store = SqliteNodeStore::open(&path).unwrap();
        let node = store.get_node("n1").unwrap().expect("node present");
        assert_eq!(node.role, "user");
        assert_eq!(node.project.as_deref(), Some("deck"));
    }

    #[test]
    fn missing_node_is_none_not_error() {
        let (_dir, path) = fixture();
        let store = SqliteNodeStore::open(&path).unwrap();
        assert!(store.get_node("missing").unwrap().is_none());
    }

    #[test]
    fn facet_upsert_replaces_wholesale() {
        let (_dir, path) = fixture();
        let store = SqliteNodeStore::open(&path).unwrap();
        let facet = SessionFacet {
            session_id: "n1".into(),
            underlying_goal: "fix the bug".into(),
            goal_category: "bug-fix".into(),
            outcome: "success".into(),
            session_type: "interactive".into(),
            friction_types: vec!["tool-errors".into()],
            brief_summary: "fixed it".into(),
            extracted_at: Utc::now(),
        };
        store.save_facet(&facet).unwrap();

        let updated = SessionFacet {
            outcome: "partial-success".into(),
            ..facet.clone()
        };
        store.save_facet(&updated).unwrap();

        let fetched = store.get_facet("n1").unwrap().expect("facet present");
        assert_eq!(fetched.outcome, "partial-success");
        assert_eq!(store.list_facets().unwrap().len(), 1);
    }
}
