//! Facet worker (spec §4.6): a one-shot pipeline that extracts facets for
//! every session lacking one, with bounded parallel fan-out.

use super::extractor::Extractor;
use super::llm::LlmCaller;
use crate::cancel::CancellationToken;
use crate::model::{Filters, SortDir, SortKey};
use crate::query::QueryEngine;
use crate::store::NodeStore;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum number of concurrent extractions, to respect external
/// provider rate limits (spec §4.6, §5).
const MAX_CONCURRENT_EXTRACTIONS: usize = 2;

/// Tracks extraction progress for a single `Run`, readable concurrently
/// via `progress()` without taking a lock.
pub struct FacetWorker {
    done: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl Clone for FacetWorker {
    fn clone(&self) -> Self {
        Self {
            done: self.done.clone(),
            total: self.total.clone(),
        }
    }
}

impl FacetWorker {
    pub fn new() -> Self {
        Self {
            done: Arc::new(AtomicU64::new(0)),
            total: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Best-effort snapshot of `(done, total)`, callable concurrently
    /// with `run`.
    pub fn progress(&self) -> (u64, u64) {
        (self.done.load(Ordering::SeqCst), self.total.load(Ordering::SeqCst))
    }

    /// Extracts facets for every session without one, fanning out across
    /// at most `MAX_CONCURRENT_EXTRACTIONS` workers. Never fails the run
    /// on a single session's error; logs and continues instead.
    pub async fn run(
        &self,
        store: Arc<dyn NodeStore>,
        query: Arc<QueryEngine>,
        caller: Arc<LlmCaller>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let filters = Filters {
            sort: SortKey::Date,
            sort_dir: SortDir::Desc,
            ..Default::default()
        };
        let overview = query.overview(&filters, &cancel)?;

        let mut pending = Vec::new();
        for s in &overview.sessions {
            if cancel.is_cancelled() {
                break;
            }
            match store.get_facet(&s.id) {
                Ok(Some(_)) => continue,
                Ok(None) => pending.push(s.id.clone()),
                Err(e) => {
                    tracing::warn!(session_id = %s.id, error = %e, "failed to check facet store");
                }
            }
        }

        self.total.store(pending.len() as u64, Ordering::SeqCst);
        self.done.store(0, Ordering::SeqCst);

        let extractor = Extractor::new(&query, &caller);
        stream::iter(pending)
            .map(|session_id| {
                let extractor = &extractor;
                let store = &store;
                let cancel = &cancel;
                async move {
                    if !cancel.is_cancelled() {
                        match extractor.extract(&session_id, cancel).await {
                            Ok(facet) => {
                                if let Err(e) = store.save_facet(&facet) {
                                    tracing::warn!(session_id = %session_id, error = %e, "failed to save facet");
                                }
                            }
                            Err(e) => {
                                tracing::warn!(session_id = %session_id, error = %e, "facet extraction failed");
                            }
                        }
                    }
                    self.done.fetch_add(1, Ordering::SeqCst);
                }
            })
            .buffer_unordered(MAX_CONCURRENT_EXTRACTIONS)
            .collect::<Vec<()>>()
            .await;

        Ok(())
    }
}

impl Default for FacetWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_starts_at_zero() {
        let worker = FacetWorker::new();
        assert_eq!(worker.progress(), (0, 0));
    }

    #[test]
    fn clones_share_the_same_counters() {
        let worker = FacetWorker::new();
        let clone = worker.clone();
        worker.done.fetch_add(1, Ordering::SeqCst);
        assert_eq!(clone.progress().0, 1);
    }
}
