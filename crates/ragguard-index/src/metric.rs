//! Similarity scoring between a query vector and stored chunk vectors.

use ragguard_core::types::Metric;

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scores a stored vector whose norm was computed at insert time.
/// Cosine against a zero vector scores 0.
pub fn score(metric: Metric, query: &[f32], query_norm: f32, stored: &[f32], stored_norm: f32) -> f32 {
    match metric {
        Metric::Dot => dot(query, stored),
        Metric::Cosine => {
            let denom = query_norm * stored_norm;
            if denom == 0.0 {
                0.0
            } else {
                dot(query, stored) / denom
            }
        }
    }
}
