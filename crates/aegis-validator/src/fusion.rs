//! Decision fuser: combine stage outputs into one verdict
//!
//! The rule, applied over whichever stages actually completed:
//! 1. any insecure vote with confidence >= 0.9 blocks (single veto)
//! 2. two or more insecure votes block (consensus)
//! 3. exactly one insecure vote at or above the tier's mid-threshold blocks
//!    softly (`warning = true`)
//! 4. otherwise allow
//!
//! Category and rationale come from the highest-confidence insecure stage;
//! allowed verdicts carry neither.

use std::time::Duration;

use aegis_types::{StageKind, StageResult, Verdict};

use crate::tiers::{TierPolicy, VETO_CONFIDENCE};

/// Fuse completed stage results into the final verdict
pub fn fuse(results: &[StageResult], policy: &TierPolicy, total_elapsed: Duration) -> Verdict {
    let stages_used: Vec<StageKind> = results.iter().map(|r| r.stage).collect();

    let mut insecure: Vec<&StageResult> = results.iter().filter(|r| !r.secure).collect();
    insecure.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let block = match insecure.as_slice() {
        [] => None,
        votes if votes[0].confidence >= VETO_CONFIDENCE => Some(false),
        votes if votes.len() >= 2 => Some(false),
        [lone] if lone.confidence >= policy.mid_threshold => Some(true),
        _ => None,
    };

    match block {
        Some(warning) => {
            let deciding = insecure[0];
            Verdict {
                secure: false,
                confidence: deciding.confidence,
                category: deciding.category,
                rationale: Some(
                    deciding
                        .rationale
                        .clone()
                        .unwrap_or_else(|| format!("Flagged by {} stage", deciding.stage)),
                ),
                suggested_fix: insecure.iter().find_map(|r| r.suggested_fix.clone()),
                warning,
                stages_used,
                total_elapsed,
            }
        }
        None => {
            // Clearing confidence: mean over the secure votes, or a weak
            // prior when nothing voted secure (all non-votes filtered
            // earlier).
            let secure_votes: Vec<f64> = results
                .iter()
                .filter(|r| r.secure)
                .map(|r| r.confidence)
                .collect();
            let confidence = if secure_votes.is_empty() {
                0.5
            } else {
                secure_votes.iter().sum::<f64>() / secure_votes.len() as f64
            };
            Verdict::allow(confidence, stages_used, total_elapsed)
        }
    }
}

/// The stage whose insecure vote decided the verdict, when blocked
pub fn deciding_stage<'a>(results: &'a [StageResult], verdict: &Verdict) -> Option<&'a StageResult> {
    if verdict.secure {
        return None;
    }
    results
        .iter()
        .filter(|r| !r.secure)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}
