//! Pipeline stages
//!
//! Three stages, one result shape: each produces a `StageResult` so the
//! fuser can treat them uniformly. Sequencing and escalation live in
//! `pipeline`, not here.

pub mod classifier;
pub mod fast;
pub mod judge;

pub use classifier::BehavioralClassifier;
pub use fast::FastMatcher;
pub use judge::SemanticJudge;
