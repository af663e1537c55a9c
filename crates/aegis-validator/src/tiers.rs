//! Per-tier pipeline policy
//!
//! Thresholds form a monotone table: stricter tiers use lower cutoffs for
//! insecurity signals (easier to block) and higher cutoffs for clearing a
//! stage as secure.

use aegis_types::SecurityTier;

/// A single insecure stage vote at or above this confidence blocks at every
/// tier, regardless of consensus.
pub const VETO_CONFIDENCE: f64 = 0.9;

/// When the semantic judge runs for a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeMode {
    /// Tier never consults the judge
    Never,
    /// Judge runs only when fast + classifier are inconclusive
    OnInconclusive,
    /// Judge always runs (defense in depth, not an optimization target)
    Always,
}

/// Numeric policy governing one tier's pipeline run
#[derive(Debug, Clone, Copy)]
pub struct TierPolicy {
    pub tier: SecurityTier,
    /// Fast-matcher confidence at which a match short-circuits to a block
    pub block_cutoff: f64,
    /// Classifier score at or above which the stage votes insecure
    pub anomaly_cutoff: f64,
    /// Confidence a lone insecure vote needs to produce a (soft) block
    pub mid_threshold: f64,
    /// Classifier score at or below which the stage is decisively secure
    pub clear_threshold: f64,
    /// Whether the behavioral classifier runs at all
    pub run_classifier: bool,
    pub judge_mode: JudgeMode,
}

impl TierPolicy {
    pub fn for_tier(tier: SecurityTier) -> Self {
        match tier {
            SecurityTier::Minimal => Self {
                tier,
                block_cutoff: 0.95,
                anomaly_cutoff: 0.90,
                mid_threshold: 0.80,
                clear_threshold: 0.30,
                run_classifier: false,
                judge_mode: JudgeMode::Never,
            },
            SecurityTier::Low => Self {
                tier,
                block_cutoff: 0.92,
                anomaly_cutoff: 0.80,
                mid_threshold: 0.75,
                clear_threshold: 0.40,
                run_classifier: true,
                judge_mode: JudgeMode::Never,
            },
            SecurityTier::Standard => Self {
                tier,
                block_cutoff: 0.90,
                anomaly_cutoff: 0.70,
                mid_threshold: 0.70,
                clear_threshold: 0.50,
                run_classifier: true,
                judge_mode: JudgeMode::OnInconclusive,
            },
            SecurityTier::High => Self {
                tier,
                block_cutoff: 0.85,
                anomaly_cutoff: 0.60,
                mid_threshold: 0.60,
                clear_threshold: 0.60,
                run_classifier: true,
                judge_mode: JudgeMode::Always,
            },
            SecurityTier::Maximum => Self {
                tier,
                block_cutoff: 0.80,
                anomaly_cutoff: 0.50,
                mid_threshold: 0.50,
                clear_threshold: 0.70,
                run_classifier: true,
                judge_mode: JudgeMode::Always,
            },
        }
    }
}
