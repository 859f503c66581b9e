//! GuardrailEngine: query → retrieve → score → decide.
//!
//! Every call yields a `GuardrailDecision` unless the caller or deployment is
//! misconfigured. Embedding, index and deadline failures become refusals.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use ragguard_core::config::Settings;
use ragguard_core::deadline::Deadline;
use ragguard_core::error::{Error, Result};
use ragguard_core::filter::Filter;
use ragguard_core::traits::{Embedder, IndexStore};
use ragguard_core::types::{ConfidenceScore, GuardrailDecision, Query};

use crate::confidence::ConfidenceScorer;
use crate::injection::SignatureSet;
use crate::policy::{PolicyEngine, PolicyRule};
use crate::retriever::Retriever;

/// Per-request knobs, normally taken from `Settings` and overridden per call.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub max_context_length: usize,
    pub timeout: Option<Duration>,
}

impl EvalConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            top_k: settings.retrieval.top_k,
            min_score: settings.retrieval.min_score,
            max_context_length: settings.guardrail.max_context_length,
            timeout: settings.guardrail.timeout(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_max_context_length(mut self, max_context_length: usize) -> Self {
        self.max_context_length = max_context_length;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::Configuration("top_k must be >= 1".into()));
        }
        if !self.min_score.is_finite() {
            return Err(Error::Configuration("min_score must be finite".into()));
        }
        if self.max_context_length == 0 {
            return Err(Error::Configuration("max_context_length must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

pub struct GuardrailEngine {
    retriever: Retriever,
    scorer: ConfidenceScorer,
    policy: PolicyEngine,
    embedder: Option<Arc<dyn Embedder>>,
}

impl GuardrailEngine {
    pub fn new(index: Arc<dyn IndexStore>, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        if index.dimension() != settings.index.dimension {
            return Err(Error::Configuration(format!(
                "index dimension {} does not match configured dimension {}",
                index.dimension(),
                settings.index.dimension
            )));
        }
        let signatures = SignatureSet::from_specs(&settings.guardrail.extra_signatures)?;
        debug!(version = signatures.version(), signatures = signatures.len(), "loaded injection signatures");
        Ok(Self {
            retriever: Retriever::new(index),
            scorer: ConfidenceScorer::from_settings(&settings.confidence)?,
            policy: PolicyEngine::new(signatures),
            embedder: None,
        })
    }

    /// Attaches the embedder used by [`GuardrailEngine::evaluate_text`].
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let expected = self.retriever.index().dimension();
        if embedder.dim() != expected {
            return Err(Error::Configuration(format!(
                "embedder dimension {} does not match index dimension {}",
                embedder.dim(),
                expected
            )));
        }
        self.embedder = Some(embedder);
        Ok(self)
    }

    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.policy = self.policy.with_rule(rule);
        self
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Names of the injection signatures matching `text`.
    pub fn scan(&self, text: &str) -> Vec<&str> {
        self.policy.signatures().scan(text)
    }

    pub fn evaluate(
        &self,
        query_text: &str,
        embedding: &[f32],
        filter: Option<&Filter>,
        config: &EvalConfig,
    ) -> Result<GuardrailDecision> {
        config.validate()?;
        let deadline = Deadline::from_timeout(config.timeout);
        if embedding.iter().any(|v| !v.is_finite()) {
            return refuse_on(Error::EmbeddingFailure("query embedding has non-finite values".into()));
        }

        let any = Filter::any();
        let filter = filter.unwrap_or(&any);
        let retrieval = match self.retriever.retrieve(embedding, filter, config.top_k, config.min_score, &deadline) {
            Ok(retrieval) => retrieval,
            Err(e) => return refuse_on(e),
        };
        let confidence = self.scorer.score(&retrieval);
        debug!(hits = retrieval.len(), confidence = confidence.value, band = ?confidence.band, "scored retrieval");

        let decision = self.policy.decide(query_text, &retrieval, confidence, config.max_context_length)?;
        info!(
            verdict = ?decision.verdict,
            reason = %decision.reason,
            admitted = decision.admitted.len(),
            snapshot = retrieval.snapshot_version,
            "guardrail decision"
        );
        Ok(decision)
    }

    /// Evaluates a [`Query`], honoring its context budget override.
    pub fn evaluate_query(&self, query: &Query, config: &EvalConfig) -> Result<GuardrailDecision> {
        match query.max_context_length {
            Some(budget) => {
                let config = config.clone().with_max_context_length(budget);
                self.evaluate(&query.text, &query.embedding, query.filter.as_ref(), &config)
            }
            None => self.evaluate(&query.text, &query.embedding, query.filter.as_ref(), config),
        }
    }

    /// Embeds `query_text` with the attached embedder, then evaluates it.
    pub fn evaluate_text(&self, query_text: &str, filter: Option<&Filter>, config: &EvalConfig) -> Result<GuardrailDecision> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| Error::Configuration("no embedder attached to the engine".into()))?;
        let embedding = match embedder.embed(query_text) {
            Ok(embedding) => embedding,
            Err(e) => return refuse_on(e),
        };
        self.evaluate(query_text, &embedding, filter, config)
    }
}

fn refuse_on(error: Error) -> Result<GuardrailDecision> {
    match error.refusal_reason() {
        Some(reason) => {
            warn!(%error, reason = %reason, "refusing after failure");
            Ok(GuardrailDecision::refuse(reason, ConfidenceScore::zero(), None))
        }
        None => Err(error),
    }
}
