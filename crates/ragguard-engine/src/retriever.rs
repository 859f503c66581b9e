use std::sync::Arc;
use tracing::debug;

use ragguard_core::deadline::Deadline;
use ragguard_core::error::Result;
use ragguard_core::filter::{latest_only, Filter};
use ragguard_core::traits::IndexStore;
use ragguard_core::types::RetrievalResult;

/// Filtered top-k retrieval over an [`IndexStore`] with score thresholding.
pub struct Retriever {
    index: Arc<dyn IndexStore>,
}

impl Retriever {
    pub fn new(index: Arc<dyn IndexStore>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<dyn IndexStore> {
        &self.index
    }

    /// Searches, reduces to latest versions when requested, drops hits below
    /// `min_score` and caps at `k`. An empty result is not an error.
    pub fn retrieve(
        &self,
        embedding: &[f32],
        filter: &Filter,
        k: usize,
        min_score: f32,
        deadline: &Deadline,
    ) -> Result<RetrievalResult> {
        // Older versions must see every newer candidate, not just the top k.
        let fetch = if filter.latest() { usize::MAX } else { k };
        let raw = self.index.search(embedding, filter.predicate(), fetch, deadline)?;
        let version = raw.snapshot_version;
        let fetched = raw.len();

        let mut hits = raw.into_hits();
        if filter.latest() {
            hits = latest_only(hits);
        }
        hits.retain(|h| h.score >= min_score);
        hits.truncate(k);
        deadline.check()?;

        debug!(snapshot = version, fetched, kept = hits.len(), latest = filter.latest(), "retrieved");
        Ok(RetrievalResult::from_hits(version, hits))
    }
}
