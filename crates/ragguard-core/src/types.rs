//! Domain types shared by the index, the engine and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::filter::Filter;

pub type ChunkId = String;

/// Metadata record attached to every indexed chunk.
///
/// - `doc_id`: stable source document identity shared by all of its chunks
/// - `version`: document revision; higher versions shadow lower ones under `latest` filtering
/// - optional fields never satisfy an equality filter when absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    1
}

impl ChunkMetadata {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            title: None,
            url: None,
            section: None,
            department: None,
            doc_type: None,
            version: default_version(),
            ingested_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// The atomic retrievable unit. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(id: impl Into<ChunkId>, text: impl Into<String>, embedding: Vec<f32>, metadata: ChunkMetadata) -> Self {
        Self { id: id.into(), text: text.into(), embedding, metadata }
    }

    /// Length counted in characters, the unit of the context budget.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Similarity metric, fixed per index instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    #[serde(alias = "inner_product", alias = "ip")]
    Dot,
}

/// One ranked entry of a [`RetrievalResult`]. `rank` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
    pub rank: usize,
}

/// Ranked search output. Scores are non-increasing by rank and ranks are contiguous from 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub snapshot_version: u64,
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty(snapshot_version: u64) -> Self {
        Self { snapshot_version, hits: Vec::new() }
    }

    /// Wraps `(chunk, score)` pairs that are already in rank order.
    pub fn from_sorted(snapshot_version: u64, ranked: Vec<(Arc<Chunk>, f32)>) -> Self {
        let hits = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (chunk, score))| ScoredChunk { chunk, score, rank: i + 1 })
            .collect();
        Self { snapshot_version, hits }
    }

    /// Rebuilds a result from a reduced hit list, reassigning ranks.
    pub fn from_hits(snapshot_version: u64, hits: Vec<ScoredChunk>) -> Self {
        let hits = hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| ScoredChunk { rank: i + 1, ..hit })
            .collect();
        Self { snapshot_version, hits }
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<ScoredChunk> {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn top_score(&self) -> Option<f32> {
        self.hits.first().map(|h| h.score)
    }

    pub fn scores(&self) -> Vec<f32> {
        self.hits.iter().map(|h| h.score).collect()
    }
}

/// Discrete confidence level. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceScore {
    pub value: f32,
    pub band: ConfidenceBand,
}

impl ConfidenceScore {
    pub fn zero() -> Self {
        Self { value: 0.0, band: ConfidenceBand::Low }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Answer,
    Refuse,
}

/// Why a decision was reached. Serialized as its snake_case code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    Answered,
    NoContext,
    LowConfidence,
    InjectionDetected,
    ContextOverflow,
    RetrievalTimeout,
    EmbeddingFailure,
    IndexUnavailable,
    /// Reason attached to a caller-supplied policy rule.
    Custom(String),
}

impl ReasonCode {
    pub fn as_str(&self) -> &str {
        match self {
            ReasonCode::Answered => "answered",
            ReasonCode::NoContext => "no_context",
            ReasonCode::LowConfidence => "low_confidence",
            ReasonCode::InjectionDetected => "injection_detected",
            ReasonCode::ContextOverflow => "context_overflow",
            ReasonCode::RetrievalTimeout => "retrieval_timeout",
            ReasonCode::EmbeddingFailure => "embedding_failure",
            ReasonCode::IndexUnavailable => "index_unavailable",
            ReasonCode::Custom(code) => code.as_str(),
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReasonCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Provenance of an admitted chunk, deduplicated per source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub doc_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub rank: usize,
}

/// A request: raw text, its embedding, an optional filter and an optional context budget override.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub embedding: Vec<f32>,
    pub filter: Option<Filter>,
    pub max_context_length: Option<usize>,
}

impl Query {
    pub fn new(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self { text: text.into(), embedding, filter: None, max_context_length: None }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_max_context_length(mut self, max_context_length: usize) -> Self {
        self.max_context_length = Some(max_context_length);
        self
    }
}

/// Terminal outcome of one evaluation.
///
/// On `Answer`, `admitted` is a non-empty prefix of the retrieval result and
/// `citations` covers it. On `Refuse`, both are empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailDecision {
    pub verdict: Verdict,
    pub reason: ReasonCode,
    pub admitted: Vec<ScoredChunk>,
    pub confidence: ConfidenceScore,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<u64>,
}

impl GuardrailDecision {
    pub fn refuse(reason: ReasonCode, confidence: ConfidenceScore, snapshot_version: Option<u64>) -> Self {
        Self {
            verdict: Verdict::Refuse,
            reason,
            admitted: Vec::new(),
            confidence,
            citations: Vec::new(),
            snapshot_version,
        }
    }

    pub fn answer(
        admitted: Vec<ScoredChunk>,
        confidence: ConfidenceScore,
        citations: Vec<Citation>,
        snapshot_version: Option<u64>,
    ) -> Self {
        Self {
            verdict: Verdict::Answer,
            reason: ReasonCode::Answered,
            admitted,
            confidence,
            citations,
            snapshot_version,
        }
    }

    pub fn is_answer(&self) -> bool {
        self.verdict == Verdict::Answer
    }

    pub fn admitted_text_len(&self) -> usize {
        self.admitted.iter().map(|h| h.chunk.text_len()).sum()
    }
}
