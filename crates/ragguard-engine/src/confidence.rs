//! Aggregates a ranked score list into a single confidence value and band.
//!
//! `c = 1 - (1 - s1) * (1 - (1 - w) * B)` where `B = 1 - prod_{i>=2}(1 - s_i / i)`
//! is the corroboration bonus of the lower-ranked hits and `w` the top-1 weight.
//! Scores are clamped to [0, 1] first. Each extra hit multiplies the product by
//! a factor in [0, 1], so `c` never drops when a hit rises or is added, and a
//! single hit yields `c = s1`.

use ragguard_core::config::ConfidenceSettings;
use ragguard_core::error::{Error, Result};
use ragguard_core::types::{ConfidenceBand, ConfidenceScore, RetrievalResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceScorer {
    high_threshold: f32,
    medium_threshold: f32,
    top_weight: f32,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self { high_threshold: 0.75, medium_threshold: 0.5, top_weight: 0.7 }
    }
}

impl ConfidenceScorer {
    pub fn new(high_threshold: f32, medium_threshold: f32, top_weight: f32) -> Result<Self> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(high_threshold) || !in_unit(medium_threshold) || medium_threshold > high_threshold {
            return Err(Error::Configuration(format!(
                "confidence thresholds must satisfy 0 <= medium ({}) <= high ({}) <= 1",
                medium_threshold, high_threshold
            )));
        }
        if !in_unit(top_weight) {
            return Err(Error::Configuration(format!("top weight must be in [0, 1], got {}", top_weight)));
        }
        Ok(Self { high_threshold, medium_threshold, top_weight })
    }

    pub fn from_settings(settings: &ConfidenceSettings) -> Result<Self> {
        Self::new(settings.high_threshold, settings.medium_threshold, settings.top_weight)
    }

    pub fn score(&self, result: &RetrievalResult) -> ConfidenceScore {
        self.score_values(&result.scores())
    }

    /// Scores a rank-ordered list. Empty input is zero confidence.
    pub fn score_values(&self, scores: &[f32]) -> ConfidenceScore {
        let Some(&top) = scores.first() else {
            return ConfidenceScore::zero();
        };
        let unbonused = scores
            .iter()
            .enumerate()
            .skip(1)
            .fold(1f32, |product, (i, s)| product * (1.0 - s.clamp(0.0, 1.0) / (i as f32 + 1.0)));
        let bonus = (1.0 - self.top_weight) * (1.0 - unbonused);
        let value = (1.0 - (1.0 - top.clamp(0.0, 1.0)) * (1.0 - bonus)).clamp(0.0, 1.0);
        ConfidenceScore { value, band: self.band(value) }
    }

    pub fn band(&self, value: f32) -> ConfidenceBand {
        if value >= self.high_threshold {
            ConfidenceBand::High
        } else if value >= self.medium_threshold {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_score_is_its_own_confidence() {
        let c = ConfidenceScorer::default().score_values(&[0.65]);
        assert!((c.value - 0.65).abs() < 1e-6);
        assert_eq!(c.band, ConfidenceBand::Medium);
    }

    #[test]
    fn corroborating_hits_raise_confidence() {
        let scorer = ConfidenceScorer::default();
        let alone = scorer.score_values(&[0.7]);
        let backed = scorer.score_values(&[0.7, 0.6]);
        let weak_extra = scorer.score_values(&[0.7, 0.6, 0.1]);
        assert!(backed.value > alone.value);
        assert!(weak_extra.value >= backed.value);
        // 1 - 0.3 * (1 - 0.3 * 0.3)
        assert!((backed.value - 0.727).abs() < 1e-5);
    }

    #[test]
    fn full_top_weight_ignores_lower_hits() {
        let scorer = ConfidenceScorer::new(0.75, 0.5, 1.0).unwrap();
        assert!((scorer.score_values(&[0.6, 0.6, 0.6]).value - 0.6).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.score_values(&[1.4, -0.2]).value, 1.0);
        assert_eq!(scorer.score_values(&[-0.5]).value, 0.0);
    }

    #[test]
    fn empty_is_zero_and_low() {
        assert_eq!(ConfidenceScorer::default().score_values(&[]), ConfidenceScore::zero());
    }

    #[test]
    fn bands_use_inclusive_lower_bounds() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.band(0.75), ConfidenceBand::High);
        assert_eq!(scorer.band(0.5), ConfidenceBand::Medium);
        assert_eq!(scorer.band(0.4999), ConfidenceBand::Low);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        assert!(ConfidenceScorer::new(0.4, 0.6, 0.7).is_err());
        assert!(ConfidenceScorer::new(0.8, 0.5, 1.5).is_err());
    }
}
