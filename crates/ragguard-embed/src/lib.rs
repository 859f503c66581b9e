//! Offline embedders.
//!
//! Production embeddings come from the ingestion pipeline; `HashEmbedder` is a
//! deterministic stand-in for query-time embedding when no model is attached.

use std::hash::Hasher;
use std::sync::Arc;
use tracing::debug;
use twox_hash::XxHash64;

use ragguard_core::error::{Error, Result};
use ragguard_core::traits::Embedder;

/// Feature-hashing embedder: each lowercased alphanumeric token adds a
/// hash-derived weight to one bucket, and the vector is L2-normalized.
/// Texts sharing tokens get positive cosine similarity.
pub struct HashEmbedder {
    dim: usize,
    seed: u64,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        Self::with_seed(dim, 0)
    }

    pub fn with_seed(dim: usize, seed: u64) -> Result<Self> {
        if dim == 0 {
            return Err(Error::Configuration("embedder dimension must be > 0".into()));
        }
        Ok(Self { dim, seed })
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = XxHash64::with_seed(self.seed);
        hasher.write(token.as_bytes());
        let h = hasher.finish();
        let idx = (h % self.dim as u64) as usize;
        let weight = 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32 * 0.5;
        (idx, weight)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        let mut count = 0usize;
        for token in tokens(text) {
            let (idx, weight) = self.bucket(&token);
            v[idx] += weight;
            count += 1;
        }
        if count == 0 {
            return Err(Error::EmbeddingFailure("text has no embeddable tokens".into()));
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        debug!(tokens = count, dim = self.dim, "hash embedding");
        Ok(v)
    }
}

pub fn get_default_embedder(dim: usize) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(HashEmbedder::new(dim)?))
}
