//! Ordered refusal rules followed by greedy context admission.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use ragguard_core::error::{Error, Result};
use ragguard_core::types::{
    ConfidenceBand, ConfidenceScore, GuardrailDecision, ReasonCode, RetrievalResult, ScoredChunk,
};

use crate::citations::assemble;
use crate::injection::SignatureSet;

/// What a rule sees: the raw query, the retrieval and its confidence, and
/// the injection signatures that matched the query.
pub struct RuleInput<'a> {
    pub query_text: &'a str,
    pub retrieval: &'a RetrievalResult,
    pub confidence: &'a ConfidenceScore,
    pub injection_hits: &'a [&'a str],
}

pub type RulePredicate = Arc<dyn Fn(&RuleInput<'_>) -> bool + Send + Sync>;

/// One row of the refusal table. Lower priority values run first.
#[derive(Clone)]
pub struct PolicyRule {
    pub priority: u32,
    pub name: String,
    pub reason: ReasonCode,
    predicate: RulePredicate,
}

impl PolicyRule {
    pub fn new<F>(priority: u32, name: impl Into<String>, reason: ReasonCode, predicate: F) -> Self
    where
        F: Fn(&RuleInput<'_>) -> bool + Send + Sync + 'static,
    {
        Self { priority, name: name.into(), reason, predicate: Arc::new(predicate) }
    }

    pub fn applies(&self, input: &RuleInput<'_>) -> bool {
        (self.predicate)(input)
    }
}

impl fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRule")
            .field("priority", &self.priority)
            .field("name", &self.name)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

fn default_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new(10, "no_context", ReasonCode::NoContext, |input| input.retrieval.is_empty()),
        PolicyRule::new(20, "low_confidence", ReasonCode::LowConfidence, |input| {
            input.confidence.band == ConfidenceBand::Low
        }),
        PolicyRule::new(30, "injection_detected", ReasonCode::InjectionDetected, |input| {
            !input.injection_hits.is_empty()
        }),
    ]
}

pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
    signatures: SignatureSet,
}

impl PolicyEngine {
    pub fn new(signatures: SignatureSet) -> Self {
        Self { rules: default_rules(), signatures }
    }

    /// Adds a rule; ties on priority keep insertion order.
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.priority);
        self
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    /// First matching rule refuses; otherwise chunks are admitted in rank
    /// order until the next one would exceed `max_context_length`.
    pub fn decide(
        &self,
        query_text: &str,
        retrieval: &RetrievalResult,
        confidence: ConfidenceScore,
        max_context_length: usize,
    ) -> Result<GuardrailDecision> {
        if max_context_length == 0 {
            return Err(Error::Configuration("max_context_length must be > 0".into()));
        }
        let snapshot = Some(retrieval.snapshot_version);
        let injection_hits = self.signatures.scan(query_text);
        let input = RuleInput { query_text, retrieval, confidence: &confidence, injection_hits: &injection_hits };

        if let Some(rule) = self.rules.iter().find(|r| r.applies(&input)) {
            debug!(rule = %rule.name, reason = %rule.reason, signatures = ?injection_hits, "refusal rule matched");
            return Ok(GuardrailDecision::refuse(rule.reason.clone(), confidence, snapshot));
        }

        let admitted = admit(retrieval.hits(), max_context_length);
        if admitted.is_empty() {
            debug!(budget = max_context_length, "top chunk exceeds context budget");
            return Ok(GuardrailDecision::refuse(ReasonCode::ContextOverflow, confidence, snapshot));
        }
        let citations = assemble(&admitted);
        Ok(GuardrailDecision::answer(admitted, confidence, citations, snapshot))
    }
}

/// Longest rank-order prefix whose total character count fits the budget.
pub fn admit(hits: &[ScoredChunk], max_context_length: usize) -> Vec<ScoredChunk> {
    let mut used = 0usize;
    hits.iter()
        .take_while(|h| {
            let next = used + h.chunk.text_len();
            let fits = next <= max_context_length;
            if fits {
                used = next;
            }
            fits
        })
        .cloned()
        .collect()
}
