//! Qualitative session facets: LLM-derived goal/outcome/friction metadata
//! layered on top of the quantitative session summaries (spec §4.5–§4.7).

pub mod extractor;
pub mod llm;
pub mod worker;

pub use extractor::Extractor;
pub use llm::{has_credentials, LlmCaller, LlmConfig, Provider};
pub use worker::FacetWorker;

use crate::model::{FacetAnalytics, FacetCount, SessionFacet};
use crate::store::NodeStore;
use anyhow::Result;
use std::collections::HashMap;

const TOP_FRICTION_LIMIT: usize = 10;
const RECENT_FACETS_LIMIT: usize = 20;

/// Buckets every stored facet by goal/outcome/session-type, ranks
/// friction types by frequency, and surfaces the most recent summaries
/// (spec §4.5 `AggregateFacets`).
pub fn aggregate_facets(store: &dyn NodeStore) -> Result<FacetAnalytics> {
    let mut facets = store.list_facets()?;
    facets.sort_by(|a, b| b.extracted_at.cmp(&a.extracted_at));

    let by_goal_category = bucket(&facets, |f| f.goal_category.clone());
    let by_outcome = bucket(&facets, |f| f.outcome.clone());
    let by_session_type = bucket(&facets, |f| f.session_type.clone());

    let mut friction_counts: HashMap<String, u64> = HashMap::new();
    for f in &facets {
        for t in &f.friction_types {
            *friction_counts.entry(t.clone()).or_insert(0) += 1;
        }
    }
    let mut top_friction_types: Vec<FacetCount> = friction_counts
        .into_iter()
        .map(|(key, count)| FacetCount { key, count })
        .collect();
    top_friction_types.sort_by(|a, b| b.count.cmp(&a.count));
    top_friction_types.truncate(TOP_FRICTION_LIMIT);

    let recent: Vec<SessionFacet> = facets.into_iter().take(RECENT_FACETS_LIMIT).collect();

    Ok(FacetAnalytics {
        by_goal_category,
        by_outcome,
        by_session_type,
        top_friction_types,
        recent,
    })
}

fn bucket(facets: &[SessionFacet], key_of: impl Fn(&SessionFacet) -> String) -> Vec<FacetCount> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for f in facets {
        *counts.entry(key_of(f)).or_insert(0) += 1;
    }
    let mut rows: Vec<FacetCount> = counts
        .into_iter()
        .map(|(key, count)| FacetCount { key, count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockStore {
        facets: Mutex<Vec<SessionFacet>>,
    }

    impl NodeStore for MockStore {
        fn get_node(&self, _id: &str) -> Result<Option<Node>> {
            Ok(None)
        }
        fn all_nodes(&self) -> Result<Vec<Node>> {
            Ok(vec![])
        }
        fn get_facet(&self, session_id: &str) -> Result<Option<SessionFacet>> {
            Ok(self.facets.lock().unwrap().iter().find(|f| f.session_id == session_id).cloned())
        }
        fn save_facet(&self, facet: &SessionFacet) -> Result<()> {
            let mut facets = self.facets.lock().unwrap();
            facets.retain(|f| f.session_id != facet.session_id);
            facets.push(facet.clone());
            Ok(())
        }
        fn list_facets(&self) -> Result<Vec<SessionFacet>> {
            Ok(self.facets.lock().unwrap().clone())
        }
    }

    fn facet(session_id: &str, goal_category: &str, age_secs: i64) -> SessionFacet {
        SessionFacet {
            session_id: session_id.to_string(),
            underlying_goal: "fix it".into(),
            goal_category: goal_category.to_string(),
            outcome: "success".into(),
            session_type: "interactive".into(),
            friction_types: vec!["tool-errors".into()],
            brief_summary: "fixed it".into(),
            extracted_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn aggregates_bucket_counts_and_recency() {
        let store = MockStore::default();
        store.save_facet(&facet("s1", "bug-fix", 100)).unwrap();
        store.save_facet(&facet("s2", "bug-fix", 50)).unwrap();
        store.save_facet(&facet("s3", "feature-development", 10)).unwrap();

        let analytics = aggregate_facets(&store).unwrap();
        assert_eq!(analytics.by_goal_category.iter().find(|c| c.key == "bug-fix").unwrap().count, 2);
        assert_eq!(analytics.top_friction_types[0].key, "tool-errors");
        assert_eq!(analytics.top_friction_types[0].count, 3);
        // most recent first
        assert_eq!(analytics.recent[0].session_id, "s3");
    }
}
