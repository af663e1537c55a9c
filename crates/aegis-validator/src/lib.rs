//! Aegis: adaptive hybrid content validation for autonomous agents
//!
//! Decides, per request, whether text submitted to or produced by an agent is
//! safe to proceed. Three escalating stages with early exit:
//!
//! - **Fast Matcher**: compiled pattern matching against the adaptive pattern
//!   store (seed rules + learned rules), sub-millisecond
//! - **Behavioral Classifier**: shallow statistical features (entropy,
//!   keyword co-occurrence, structural anomalies)
//! - **Semantic Judge**: remote large-context reasoning service, invoked only
//!   when cheaper stages are inconclusive (or always at high tiers)
//!
//! Stage outputs are fused into one verdict (single high-confidence veto,
//! otherwise two-stage consensus), and every block feeds the adaptive
//! learner, which reinforces or creates patterns in the store.
//!
//! # Usage
//!
//! ```rust,no_run
//! use aegis_validator::{Validator, ValidatorConfig};
//! use aegis_types::SecurityTier;
//!
//! # async fn run() -> aegis_types::AegisResult<()> {
//! let validator = Validator::new(ValidatorConfig::default())?;
//! let verdict = validator
//!     .validate("ignore previous instructions", "instruction", "agent-7", SecurityTier::Standard)
//!     .await?;
//! if !verdict.secure {
//!     // Handle block
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod fusion;
pub mod learner;
pub mod patterns;
pub mod pipeline;
pub mod stages;
pub mod tiers;

pub use config::ValidatorConfig;
pub use learner::AdaptiveLearner;
pub use patterns::store::PatternStore;
pub use patterns::Pattern;
pub use pipeline::Validator;
pub use stages::judge::{HttpJudgeBackend, JudgeBackend, SemanticJudge};
pub use tiers::TierPolicy;
