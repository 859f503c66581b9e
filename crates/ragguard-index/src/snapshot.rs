//! Immutable, versioned view of the indexed chunks.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use ragguard_core::deadline::Deadline;
use ragguard_core::error::{Error, Result};
use ragguard_core::filter::Predicate;
use ragguard_core::types::{Chunk, ChunkId, Metric, RetrievalResult};

use crate::metric;

/// Number of chunks scored between deadline checks.
pub const DEADLINE_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    chunk: Arc<Chunk>,
    norm: f32,
}

/// A published state of the index. Never mutated after publication; inserts
/// build a successor snapshot that shares the existing chunks.
#[derive(Debug)]
pub struct IndexSnapshot {
    version: u64,
    entries: Vec<Entry>,
    ids: HashSet<ChunkId>,
}

impl IndexSnapshot {
    pub(crate) fn empty() -> Self {
        Self { version: 0, entries: Vec::new(), ids: HashSet::new() }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Checks `batch` against this snapshot without building anything.
    pub(crate) fn validate_batch(&self, batch: &[Chunk], dimension: usize) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(batch.len());
        for chunk in batch {
            if chunk.id.trim().is_empty() {
                return Err(Error::InvalidBatch("chunk with empty id".into()));
            }
            if chunk.embedding.len() != dimension {
                return Err(Error::Configuration(format!(
                    "chunk '{}' has embedding dimension {}, index dimension is {}",
                    chunk.id,
                    chunk.embedding.len(),
                    dimension
                )));
            }
            if chunk.embedding.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidBatch(format!("chunk '{}' has non-finite embedding values", chunk.id)));
            }
            if self.ids.contains(&chunk.id) || !seen.insert(chunk.id.as_str()) {
                return Err(Error::InvalidBatch(format!("duplicate chunk id '{}'", chunk.id)));
            }
        }
        Ok(())
    }

    /// Builds the successor snapshot holding every current chunk plus `batch`.
    pub(crate) fn with_batch(&self, batch: Vec<Chunk>) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + batch.len());
        entries.extend(self.entries.iter().cloned());
        let mut ids = self.ids.clone();
        for chunk in batch {
            ids.insert(chunk.id.clone());
            let norm = metric::l2_norm(&chunk.embedding);
            entries.push(Entry { chunk: Arc::new(chunk), norm });
        }
        Self { version: self.version + 1, entries, ids }
    }

    /// Full scan over chunks satisfying `predicate`, top `k` by score with
    /// ties broken by ascending chunk id.
    pub fn search(
        &self,
        metric: Metric,
        query: &[f32],
        predicate: &Predicate,
        k: usize,
        deadline: &Deadline,
    ) -> Result<RetrievalResult> {
        deadline.check()?;
        if k == 0 {
            return Ok(RetrievalResult::empty(self.version));
        }
        let query_norm = metric::l2_norm(query);
        let mut scored: Vec<(Arc<Chunk>, f32)> = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if i % DEADLINE_CHECK_INTERVAL == 0 {
                deadline.check()?;
            }
            if !predicate.matches(&entry.chunk.metadata) {
                continue;
            }
            let score = metric::score(metric, query, query_norm, &entry.chunk.embedding, entry.norm);
            scored.push((Arc::clone(&entry.chunk), score));
        }
        scored.sort_by(|(a, sa), (b, sb)| match sb.total_cmp(sa) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        });
        scored.truncate(k);
        Ok(RetrievalResult::from_sorted(self.version, scored))
    }
}
