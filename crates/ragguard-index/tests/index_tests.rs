use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use ragguard_core::deadline::Deadline;
use ragguard_core::filter::{Field, Predicate, Value};
use ragguard_core::traits::IndexStore;
use ragguard_core::types::{Chunk, ChunkMetadata, Metric};
use ragguard_core::Error;
use ragguard_index::SimilarityIndex;

/// Unit vector whose cosine with `(1, 0)` is `s`.
fn at(s: f32) -> Vec<f32> {
    vec![s, (1.0 - s * s).max(0.0).sqrt()]
}

fn chunk(id: &str, doc: &str, score: f32) -> Chunk {
    Chunk::new(id, format!("text of {id}"), at(score), ChunkMetadata::new(doc))
}

fn index_with(chunks: Vec<Chunk>) -> SimilarityIndex {
    let index = SimilarityIndex::new(2, Metric::Cosine).unwrap();
    index.insert_batch(chunks).unwrap();
    index
}

fn ids(index: &SimilarityIndex, predicate: &Predicate, k: usize) -> Vec<String> {
    index
        .search(&[1.0, 0.0], predicate, k, &Deadline::none())
        .unwrap()
        .hits()
        .iter()
        .map(|h| h.chunk.id.clone())
        .collect()
}

#[test]
fn search_orders_by_score_and_truncates() {
    let index = index_with(vec![chunk("a", "d1", 0.2), chunk("b", "d2", 0.9), chunk("c", "d3", 0.6)]);
    let result = index.search(&[1.0, 0.0], &Predicate::Any, 2, &Deadline::none()).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.hits()[0].chunk.id, "b");
    assert_eq!(result.hits()[1].chunk.id, "c");
    assert_eq!(result.hits()[0].rank, 1);
    assert_eq!(result.hits()[1].rank, 2);
    assert!((result.hits()[0].score - 0.9).abs() < 1e-5);
}

#[test]
fn ties_break_by_ascending_chunk_id() {
    let index = index_with(vec![chunk("z", "d", 0.5), chunk("m", "d", 0.5), chunk("a", "d", 0.5)]);
    assert_eq!(ids(&index, &Predicate::Any, 3), vec!["a", "m", "z"]);
}

#[test]
fn predicate_is_applied_before_top_k() {
    let index = index_with(vec![
        Chunk::new("hr", "hr", at(0.4), ChunkMetadata::new("hr").with_department("HR")),
        Chunk::new("it", "it", at(0.9), ChunkMetadata::new("it").with_department("IT")),
    ]);
    let hr = Predicate::Eq(Field::Department, Value::Text("HR".into()));
    assert_eq!(ids(&index, &hr, 1), vec!["hr"]);
}

#[test]
fn k_zero_and_large_k() {
    let index = index_with(vec![chunk("a", "d", 0.3), chunk("b", "d", 0.4)]);
    assert!(ids(&index, &Predicate::Any, 0).is_empty());
    assert_eq!(ids(&index, &Predicate::Any, 100).len(), 2);
}

#[test]
fn unpublished_index_is_unavailable() {
    let index = SimilarityIndex::new(2, Metric::Cosine).unwrap();
    let err = index.search(&[1.0, 0.0], &Predicate::Any, 5, &Deadline::none()).unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable));

    index.insert_batch(Vec::new()).unwrap();
    let result = index.search(&[1.0, 0.0], &Predicate::Any, 5, &Deadline::none()).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.snapshot_version, 1);
}

#[test]
fn dimension_mismatch_is_configuration_error() {
    assert!(matches!(SimilarityIndex::new(0, Metric::Cosine), Err(Error::Configuration(_))));

    let index = index_with(vec![chunk("a", "d", 0.3)]);
    let err = index.search(&[1.0, 0.0, 0.0], &Predicate::Any, 5, &Deadline::none()).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let bad = Chunk::new("x", "t", vec![1.0; 3], ChunkMetadata::new("d"));
    assert!(matches!(index.insert_batch(vec![bad]), Err(Error::Configuration(_))));
}

#[test]
fn rejected_batch_publishes_nothing() {
    let index = index_with(vec![chunk("a", "d", 0.3)]);
    let before = index.version();

    let duplicate_in_batch = vec![chunk("b", "d", 0.1), chunk("b", "d", 0.2)];
    assert!(matches!(index.insert_batch(duplicate_in_batch), Err(Error::InvalidBatch(_))));

    let duplicate_of_existing = vec![chunk("c", "d", 0.1), chunk("a", "d", 0.2)];
    assert!(matches!(index.insert_batch(duplicate_of_existing), Err(Error::InvalidBatch(_))));

    let non_finite = vec![Chunk::new("n", "t", vec![f32::NAN, 0.0], ChunkMetadata::new("d"))];
    assert!(matches!(index.insert_batch(non_finite), Err(Error::InvalidBatch(_))));

    assert_eq!(index.version(), before);
    assert_eq!(index.len(), 1);
}

#[test]
fn zero_vector_scores_zero_under_cosine() {
    let index = index_with(vec![Chunk::new("zero", "t", vec![0.0, 0.0], ChunkMetadata::new("d"))]);
    let result = index.search(&[1.0, 0.0], &Predicate::Any, 1, &Deadline::none()).unwrap();
    assert_eq!(result.top_score(), Some(0.0));
}

#[test]
fn dot_metric_uses_raw_inner_product() {
    let index = SimilarityIndex::new(2, Metric::Dot).unwrap();
    index
        .insert_batch(vec![Chunk::new("big", "t", vec![4.0, 0.0], ChunkMetadata::new("d"))])
        .unwrap();
    let result = IndexStore::search(&index, &[0.5, 0.0], &Predicate::Any, 1, &Deadline::none()).unwrap();
    assert_eq!(result.top_score(), Some(2.0));
}

#[test]
fn expired_deadline_aborts_scan() {
    let index = index_with(vec![chunk("a", "d", 0.3)]);
    let err = index
        .search(&[1.0, 0.0], &Predicate::Any, 5, &Deadline::after(Duration::ZERO))
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[test]
fn snapshot_held_by_reader_survives_later_inserts() {
    let index = index_with(vec![chunk("a", "d", 0.3)]);
    let held = index.snapshot().unwrap();
    index.insert_batch(vec![chunk("b", "d", 0.4)]).unwrap();

    assert_eq!(held.len(), 1);
    assert!(!held.contains("b"));
    assert_eq!(index.snapshot().unwrap().len(), 2);
}

#[test]
fn concurrent_readers_see_whole_batches_only() {
    const BATCH: usize = 5;
    const BATCHES: usize = 40;

    let index = SimilarityIndex::new(2, Metric::Cosine).unwrap();
    index.insert_batch(Vec::new()).unwrap();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let result = index
                        .search(&[1.0, 0.0], &Predicate::Any, usize::MAX, &Deadline::none())
                        .unwrap();
                    let expected = BATCH * (result.snapshot_version as usize - 1);
                    assert_eq!(result.len(), expected, "partial batch visible");
                }
            });
        }
        scope.spawn(|| {
            for b in 0..BATCHES {
                let batch = (0..BATCH)
                    .map(|i| chunk(&format!("b{b}-c{i}"), &format!("doc{b}"), 0.5))
                    .collect();
                index.insert_batch(batch).unwrap();
            }
            done.store(true, Ordering::Release);
        });
    });

    assert_eq!(index.len(), BATCH * BATCHES);
    assert_eq!(index.version(), Some(BATCHES as u64 + 1));
}

#[test]
fn concurrent_writers_lose_no_batches() {
    let index = SimilarityIndex::new(2, Metric::Cosine).unwrap();
    std::thread::scope(|scope| {
        for w in 0..4 {
            let index = &index;
            scope.spawn(move || {
                for b in 0..10 {
                    index.insert_batch(vec![chunk(&format!("w{w}-b{b}"), "d", 0.5)]).unwrap();
                }
            });
        }
    });
    assert_eq!(index.len(), 40);
    assert_eq!(index.version(), Some(40));
}

proptest! {
    #[test]
    fn results_are_bounded_and_sorted(
        scores in prop::collection::vec(0.0f32..=1.0, 0..40),
        k in 0usize..50,
    ) {
        let chunks = scores
            .iter()
            .enumerate()
            .map(|(i, s)| chunk(&format!("c{i:03}"), "d", *s))
            .collect();
        let index = index_with(chunks);
        let result = index.search(&[1.0, 0.0], &Predicate::Any, k, &Deadline::none()).unwrap();

        prop_assert!(result.len() <= k);
        prop_assert_eq!(result.len(), k.min(scores.len()));
        for pair in result.hits().windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                prop_assert!(pair[0].chunk.id < pair[1].chunk.id);
            }
        }
        for (i, hit) in result.hits().iter().enumerate() {
            prop_assert_eq!(hit.rank, i + 1);
        }
    }
}
