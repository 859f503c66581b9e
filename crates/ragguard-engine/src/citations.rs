use std::collections::HashSet;

use ragguard_core::types::{Citation, ScoredChunk};

/// One citation per source document, in order of first appearance. The
/// section comes from the document's highest-ranked admitted chunk; a
/// missing title falls back to the document id.
pub fn assemble(admitted: &[ScoredChunk]) -> Vec<Citation> {
    let mut seen: HashSet<&str> = HashSet::new();
    admitted
        .iter()
        .filter(|hit| seen.insert(hit.chunk.metadata.doc_id.as_str()))
        .map(|hit| {
            let meta = &hit.chunk.metadata;
            Citation {
                doc_id: meta.doc_id.clone(),
                title: meta.title.clone().unwrap_or_else(|| meta.doc_id.clone()),
                url: meta.url.clone(),
                section: meta.section.clone(),
                rank: hit.rank,
            }
        })
        .collect()
}
