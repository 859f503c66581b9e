//! Layered configuration and path helpers.
//!
//! Uses Figment to merge serialized defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__TOP_K=8`). Provides helpers to expand `~` and `${VAR}` and
//! to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Metric;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_in(Path::new("."))
    }

    /// Loads the config files found in `base`.
    pub fn load_in(base: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if matches!(self.env_name.as_str(), "prod" | "production") && settings.guardrail.timeout_ms == 0 {
            anyhow::bail!("Prod config must set guardrail.timeout_ms");
        }
        Ok(())
    }
}

/// Typed view of the full configuration tree. Every section has defaults, so
/// a partial `config.toml` is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
    pub confidence: ConfidenceSettings,
    pub guardrail: GuardrailSettings,
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub dimension: usize,
    pub metric: Metric,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { dimension: 384, metric: Metric::Cosine }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 5, min_score: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceSettings {
    pub high_threshold: f32,
    pub medium_threshold: f32,
    /// Weight of the top-1 score. Lower-ranked hits can close at most `1 - top_weight` of the gap to 1.
    pub top_weight: f32,
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self { high_threshold: 0.75, medium_threshold: 0.5, top_weight: 0.7 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailSettings {
    pub max_context_length: usize,
    /// Per-request retrieval timeout; 0 disables it.
    pub timeout_ms: u64,
    pub extra_signatures: Vec<SignatureSpec>,
}

impl Default for GuardrailSettings {
    fn default() -> Self {
        Self { max_context_length: 4000, timeout_ms: 2000, extra_signatures: Vec::new() }
    }
}

impl GuardrailSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// A named injection pattern added on top of the built-in signature set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSpec {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub batch_path: Option<String>,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.index.dimension == 0 {
            return Err(Error::Configuration("index.dimension must be > 0".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Configuration("retrieval.top_k must be >= 1".into()));
        }
        if !self.retrieval.min_score.is_finite() {
            return Err(Error::Configuration("retrieval.min_score must be finite".into()));
        }
        let c = &self.confidence;
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(c.medium_threshold) || !in_unit(c.high_threshold) || c.medium_threshold > c.high_threshold {
            return Err(Error::Configuration(format!(
                "confidence thresholds must satisfy 0 <= medium ({}) <= high ({}) <= 1",
                c.medium_threshold, c.high_threshold
            )));
        }
        if !in_unit(c.top_weight) {
            return Err(Error::Configuration(format!("confidence.top_weight must be in [0, 1], got {}", c.top_weight)));
        }
        if self.guardrail.max_context_length == 0 {
            return Err(Error::Configuration("guardrail.max_context_length must be > 0".into()));
        }
        if let Some(sig) = self.guardrail.extra_signatures.iter().find(|s| s.name.trim().is_empty()) {
            return Err(Error::Configuration(format!("signature with pattern '{}' has no name", sig.pattern)));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
