//! Versioned prompt-injection signatures evaluated against the raw query.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use ragguard_core::config::SignatureSpec;
use ragguard_core::error::{Error, Result};

pub const BUILTIN_VERSION: &str = "2024-06";

const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    (
        "ignore_previous",
        r"\b(?:ignore|disregard|forget|override)\b.{0,40}\b(?:previous|prior|above|earlier|preceding|all|your)\b.{0,40}\b(?:instructions?|prompts?|rules|directions|guidelines)\b",
    ),
    (
        "reveal_system_prompt",
        r"\b(?:reveal|show|print|display|repeat|output|leak|dump|tell me)\b.{0,40}\b(?:system|hidden|initial|original|secret)\s+(?:prompt|instructions?|message|rules)\b",
    ),
    (
        "role_override",
        r"\b(?:you are now|from now on,? you (?:are|will)|pretend (?:to be|you are|that you are)|roleplay as|act as (?:an? )?(?:unrestricted|unfiltered|uncensored|evil|different)\b)",
    ),
    ("jailbreak_keywords", r"\b(?:jailbreak|jailbroken|dan mode|developer mode|do anything now|god mode)\b"),
    (
        "delimiter_injection",
        r"(?:<\|im_start\|>|<\|im_end\|>|<\|system\|>|\[/?INST\]|<</?SYS>>|###\s*(?:system|instructions?)\s*:)",
    ),
    (
        "safety_bypass",
        r"\b(?:bypass|disable|turn off|circumvent|ignore)\b.{0,30}\b(?:safety|guardrails?|filters?|content polic(?:y|ies)|restrictions|moderation)\b",
    ),
];

#[derive(Debug, Clone)]
struct Signature {
    name: String,
    regex: Regex,
}

fn compile(name: &str, pattern: &str) -> std::result::Result<Signature, String> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(|regex| Signature { name: name.to_string(), regex })
        .map_err(|e| format!("invalid injection signature '{}': {}", name, e))
}

static BUILTIN: LazyLock<std::result::Result<Vec<Signature>, String>> =
    LazyLock::new(|| BUILTIN_PATTERNS.iter().map(|(name, pattern)| compile(name, pattern)).collect());

/// Strips zero-width characters and collapses whitespace runs, so spacing
/// tricks do not split a signature.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Named, case-insensitive injection patterns. Extensions bump the version
/// with a `+<count>` suffix so logs show which set produced a decision.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    version: String,
    signatures: Vec<Signature>,
}

impl SignatureSet {
    pub fn builtin() -> Result<Self> {
        let signatures = BUILTIN.clone().map_err(Error::Configuration)?;
        Ok(Self { version: BUILTIN_VERSION.to_string(), signatures })
    }

    /// The built-in set extended with configured signatures.
    pub fn from_specs(extra: &[SignatureSpec]) -> Result<Self> {
        extra
            .iter()
            .try_fold(Self::builtin()?, |set, sig| set.with_signature(&sig.name, &sig.pattern))
    }

    pub fn with_signature(mut self, name: &str, pattern: &str) -> Result<Self> {
        if self.signatures.iter().any(|s| s.name == name) {
            return Err(Error::Configuration(format!("duplicate injection signature '{}'", name)));
        }
        self.signatures.push(compile(name, pattern).map_err(Error::Configuration)?);
        self.version = format!("{}+{}", BUILTIN_VERSION, self.signatures.len() - BUILTIN_PATTERNS.len());
        Ok(self)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Names of every signature matching `text` after normalization.
    pub fn scan(&self, text: &str) -> Vec<&str> {
        let normalized = normalize(text);
        self.signatures
            .iter()
            .filter(|s| s.regex.is_match(&normalized))
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        let normalized = normalize(text);
        self.signatures.iter().any(|s| s.regex.is_match(&normalized))
    }
}
