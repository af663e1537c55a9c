//! Detection patterns: the first-class, inspectable rule set behind the
//! fast matcher and the adaptive learner

pub mod seed;
pub mod store;

use aegis_types::{PatternSource, PatternTimestamps, ThreatCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hard lower bound on pattern confidence
pub const CONFIDENCE_FLOOR: f64 = 0.05;
/// Hard upper bound on pattern confidence
pub const CONFIDENCE_CEILING: f64 = 0.99;
/// Seed patterns never decay below this (curated rules keep a trust floor)
pub const SEED_CONFIDENCE_FLOOR: f64 = 0.50;
/// Patterns below this are excluded from the fast path but retained for
/// audit/history
pub const USABILITY_FLOOR: f64 = 0.10;
/// Reinforcement step applied on a confirmed match
pub const REINFORCEMENT_STEP: f64 = 0.05;

/// Clamp a confidence value into the allowed band
pub fn clamp_confidence(confidence: f64) -> f64 {
    confidence.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

/// Optional structural predicate checked after the regex matches
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuralPredicate {
    /// Minimum total input length for the pattern to apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Token that must appear somewhere in the input (case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_token: Option<String>,
}

impl StructuralPredicate {
    /// Whether the input satisfies this predicate
    pub fn matches(&self, text: &str) -> bool {
        if let Some(min) = self.min_length {
            if text.len() < min {
                return false;
            }
        }
        if let Some(ref token) = self.requires_token {
            if !text.to_lowercase().contains(&token.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// A seeded or learned detection rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    /// Short human-readable name used in rationales and logs
    pub name: String,
    /// Regex source text; compiled by the store
    pub matcher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<StructuralPredicate>,
    pub category: ThreatCategory,
    pub confidence: f64,
    /// Count of confirmed matches
    pub frequency: u64,
    #[serde(flatten)]
    pub timestamps: PatternTimestamps,
    pub source: PatternSource,
}

impl Pattern {
    /// Build a curated seed pattern
    pub fn seed(
        id: &str,
        name: &str,
        matcher: &str,
        category: ThreatCategory,
        confidence: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            matcher: matcher.to_string(),
            predicate: None,
            category,
            confidence: clamp_confidence(confidence),
            frequency: 0,
            timestamps: PatternTimestamps::now(),
            source: PatternSource::Seed,
        }
    }

    /// Build a runtime-learned pattern
    pub fn learned(
        name: &str,
        matcher: &str,
        category: ThreatCategory,
        initial_confidence: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            matcher: matcher.to_string(),
            predicate: None,
            category,
            confidence: clamp_confidence(initial_confidence),
            frequency: 1,
            timestamps: PatternTimestamps::now(),
            source: PatternSource::Learned,
        }
    }

    /// Attach a structural predicate (builder style, seed corpus use)
    pub fn with_predicate(mut self, predicate: StructuralPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Whether the fast path should consider this pattern
    pub fn usable(&self) -> bool {
        self.confidence >= USABILITY_FLOOR
    }

    /// Source-dependent decay floor
    pub fn confidence_floor(&self) -> f64 {
        match self.source {
            PatternSource::Seed => SEED_CONFIDENCE_FLOOR,
            PatternSource::Learned => CONFIDENCE_FLOOR,
        }
    }

    /// Confirmed match: bump frequency, raise confidence by the bounded
    /// step, advance `last_seen`
    pub fn reinforce(&mut self, at: DateTime<Utc>) {
        self.frequency += 1;
        self.confidence = clamp_confidence(self.confidence + REINFORCEMENT_STEP);
        self.timestamps.touch(at);
    }

    /// Exponential decay over `elapsed` with the given half-life, floored
    /// per source
    pub fn decay(&mut self, elapsed: std::time::Duration, half_life: std::time::Duration) {
        if half_life.is_zero() {
            return;
        }
        let factor = 0.5_f64.powf(elapsed.as_secs_f64() / half_life.as_secs_f64());
        self.confidence = (self.confidence * factor).max(self.confidence_floor());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_confidence_clamped_on_construction() {
        let p = Pattern::seed("s-1", "Test", "test", ThreatCategory::Pii, 1.5);
        assert_eq!(p.confidence, CONFIDENCE_CEILING);
        let p = Pattern::learned("t", "test", ThreatCategory::Pii, -0.2);
        assert_eq!(p.confidence, CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_reinforce_is_monotone_and_capped() {
        let mut p = Pattern::learned("t", "test", ThreatCategory::PromptInjection, 0.9);
        let before = (p.confidence, p.frequency);
        for _ in 0..10 {
            let prev = p.confidence;
            p.reinforce(Utc::now());
            assert!(p.confidence >= prev);
            assert!(p.confidence <= CONFIDENCE_CEILING);
        }
        assert!(p.frequency > before.1);
        assert_eq!(p.confidence, CONFIDENCE_CEILING);
    }

    #[test]
    fn test_decay_strictly_lowers_until_floor() {
        let mut p = Pattern::learned("t", "test", ThreatCategory::Exfiltration, 0.8);
        let before = p.confidence;
        p.decay(Duration::from_secs(3600), Duration::from_secs(3600));
        assert!(p.confidence < before);
        assert!((p.confidence - before / 2.0).abs() < 1e-9);

        // Long decay bottoms out at the floor, never below
        p.decay(Duration::from_secs(3600 * 1000), Duration::from_secs(3600));
        assert_eq!(p.confidence, CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_seed_decay_floor_is_higher() {
        let mut p = Pattern::seed("s-1", "Test", "test", ThreatCategory::Pii, 0.95);
        p.decay(Duration::from_secs(3600 * 1000), Duration::from_secs(3600));
        assert_eq!(p.confidence, SEED_CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_predicate_gating() {
        let pred = StructuralPredicate {
            min_length: Some(10),
            requires_token: Some("Base64".to_string()),
        };
        assert!(pred.matches("decode this base64 blob"));
        assert!(!pred.matches("base64")); // too short
        assert!(!pred.matches("a long string without the token"));
    }

    #[test]
    fn test_usability_floor() {
        let mut p = Pattern::learned("t", "test", ThreatCategory::Pii, 0.5);
        assert!(p.usable());
        p.confidence = 0.08;
        assert!(!p.usable());
    }
}
