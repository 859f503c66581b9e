//! In-memory similarity index with copy-on-write snapshot publication.
//!
//! Readers clone the current `Arc<IndexSnapshot>` under a short read lock and
//! search it without further coordination. Writers are serialized by a
//! separate mutex, build the successor snapshot outside the pointer lock and
//! then swap it in, so a batch is either fully visible or not at all.

pub mod metric;
pub mod snapshot;

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info};

use ragguard_core::config::IndexSettings;
use ragguard_core::deadline::Deadline;
use ragguard_core::error::{Error, Result};
use ragguard_core::filter::Predicate;
use ragguard_core::traits::IndexStore;
use ragguard_core::types::{Chunk, Metric, RetrievalResult};

pub use snapshot::IndexSnapshot;

pub struct SimilarityIndex {
    dimension: usize,
    metric: Metric,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    writer: Mutex<()>,
}

impl SimilarityIndex {
    pub fn new(dimension: usize, metric: Metric) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Configuration("index dimension must be > 0".into()));
        }
        Ok(Self { dimension, metric, current: RwLock::new(None), writer: Mutex::new(()) })
    }

    pub fn from_settings(settings: &IndexSettings) -> Result<Self> {
        Self::new(settings.dimension, settings.metric)
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.current.read().clone().ok_or(Error::IndexUnavailable)
    }

    /// Version of the published snapshot, `None` before the first insert.
    pub fn version(&self) -> Option<u64> {
        self.current.read().as_ref().map(|s| s.version())
    }

    pub fn len(&self) -> usize {
        self.current.read().as_ref().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn search(&self, embedding: &[f32], predicate: &Predicate, k: usize, deadline: &Deadline) -> Result<RetrievalResult> {
        if embedding.len() != self.dimension {
            return Err(Error::Configuration(format!(
                "query embedding dimension {} does not match index dimension {}",
                embedding.len(),
                self.dimension
            )));
        }
        let snapshot = self.snapshot()?;
        let result = snapshot.search(self.metric, embedding, predicate, k, deadline)?;
        debug!(snapshot = snapshot.version(), candidates = snapshot.len(), hits = result.len(), "index search");
        Ok(result)
    }

    /// Validates and publishes `batch` as a new snapshot, returning its version.
    /// On error the published snapshot is unchanged.
    pub fn insert_batch(&self, batch: Vec<Chunk>) -> Result<u64> {
        let _writer = self.writer.lock();
        let base = self.current.read().clone();
        let base = match base {
            Some(snapshot) => snapshot,
            None => Arc::new(IndexSnapshot::empty()),
        };
        base.validate_batch(&batch, self.dimension)?;
        let added = batch.len();
        let next = Arc::new(base.with_batch(batch));
        let version = next.version();
        let total = next.len();
        *self.current.write() = Some(next);
        info!(version, added, total, "published index snapshot");
        Ok(version)
    }
}

impl IndexStore for SimilarityIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn search(&self, embedding: &[f32], predicate: &Predicate, k: usize, deadline: &Deadline) -> Result<RetrievalResult> {
        SimilarityIndex::search(self, embedding, predicate, k, deadline)
    }

    fn insert_batch(&self, batch: Vec<Chunk>) -> Result<u64> {
        SimilarityIndex::insert_batch(self, batch)
    }
}
