use crate::deadline::Deadline;
use crate::error::Result;
use crate::filter::Predicate;
use crate::types::{Chunk, RetrievalResult};

/// Turns text into a fixed-dimension vector. Failures surface as `Error::EmbeddingFailure`.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Snapshot-versioned chunk storage with filtered nearest-neighbor search.
///
/// `search` runs against one snapshot for its whole duration; `insert_batch`
/// publishes a new snapshot containing the entire batch or nothing.
pub trait IndexStore: Send + Sync {
    fn dimension(&self) -> usize;
    fn search(&self, embedding: &[f32], predicate: &Predicate, k: usize, deadline: &Deadline) -> Result<RetrievalResult>;
    fn insert_batch(&self, batch: Vec<Chunk>) -> Result<u64>;
}
