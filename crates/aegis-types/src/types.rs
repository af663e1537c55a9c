//! Core data model for the validation pipeline

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Threat category taxonomy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    PromptInjection,
    Exfiltration,
    CommandExecution,
    Impersonation,
    Pii,
    EncodedPayload,
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PromptInjection => write!(f, "Prompt Injection"),
            Self::Exfiltration => write!(f, "Exfiltration"),
            Self::CommandExecution => write!(f, "Command Execution"),
            Self::Impersonation => write!(f, "Impersonation"),
            Self::Pii => write!(f, "PII"),
            Self::EncodedPayload => write!(f, "Encoded Payload"),
        }
    }
}

impl ThreatCategory {
    /// Parse a category from a model/judge label (case-insensitive, lenient)
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "prompt_injection" | "injection" | "instruction_override" | "jailbreak" => {
                Some(Self::PromptInjection)
            }
            "exfiltration" | "data_exfiltration" | "data_leakage" => Some(Self::Exfiltration),
            "command_execution" | "code_injection" | "command_injection" => {
                Some(Self::CommandExecution)
            }
            "impersonation" | "role_hijack" => Some(Self::Impersonation),
            "pii" | "pii_leakage" | "privacy" => Some(Self::Pii),
            "encoded_payload" | "obfuscation" | "encoding" => Some(Self::EncodedPayload),
            _ => None,
        }
    }
}

/// Ordered security strictness level. Stricter tiers run more stages and
/// block on weaker signals.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityTier {
    Minimal,
    Low,
    #[default]
    Standard,
    High,
    Maximum,
}

impl std::fmt::Display for SecurityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::Low => write!(f, "low"),
            Self::Standard => write!(f, "standard"),
            Self::High => write!(f, "high"),
            Self::Maximum => write!(f, "maximum"),
        }
    }
}

impl SecurityTier {
    /// All tiers in strictness order, loosest first
    pub fn all() -> [SecurityTier; 5] {
        [
            Self::Minimal,
            Self::Low,
            Self::Standard,
            Self::High,
            Self::Maximum,
        ]
    }
}

/// One phase of the validation pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Fast,
    Classify,
    Judge,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Classify => write!(f, "classify"),
            Self::Judge => write!(f, "judge"),
        }
    }
}

/// Analysis depth requested from the semantic judge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Basic,
    #[default]
    Standard,
    Comprehensive,
}

/// Where a detection pattern came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternSource {
    /// Curated at build time; higher trust floor
    Seed,
    /// Derived at runtime by the adaptive learner
    Learned,
}

impl PatternSource {
    /// Trust multiplier applied when evidence from this source seeds a new
    /// learned pattern's initial confidence
    pub fn trust_factor(self) -> f64 {
        match self {
            Self::Seed => 0.9,
            Self::Learned => 0.7,
        }
    }
}

/// The unit of work handed to the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Raw text to validate (post template resolution)
    pub text: String,
    /// Declared content-type hint, e.g. "instruction", "agent_output"
    pub content_type: String,
    /// Originating actor (agent id, client id)
    pub actor_id: String,
    /// Target security tier
    pub tier: SecurityTier,
}

impl ValidationRequest {
    pub fn new(
        text: impl Into<String>,
        content_type: impl Into<String>,
        actor_id: impl Into<String>,
        tier: SecurityTier,
    ) -> Self {
        Self {
            text: text.into(),
            content_type: content_type.into(),
            actor_id: actor_id.into(),
            tier,
        }
    }
}

/// Per-stage output. All three stages produce this shape so the fuser can
/// treat them uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageKind,
    pub secure: bool,
    /// Confidence in the stage's own vote, 0.0-1.0
    pub confidence: f64,
    pub category: Option<ThreatCategory>,
    pub rationale: Option<String>,
    /// Remediation hint, when the stage can produce one (judge only today)
    pub suggested_fix: Option<String>,
    /// The minimal offending span, when the stage can isolate one
    pub matched_span: Option<String>,
    pub elapsed: Duration,
}

impl StageResult {
    /// A secure result with the given clearing confidence
    pub fn secure(stage: StageKind, confidence: f64, elapsed: Duration) -> Self {
        Self {
            stage,
            secure: true,
            confidence,
            category: None,
            rationale: None,
            suggested_fix: None,
            matched_span: None,
            elapsed,
        }
    }
}

/// Final output of a validation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub secure: bool,
    pub confidence: f64,
    pub category: Option<ThreatCategory>,
    pub rationale: Option<String>,
    pub suggested_fix: Option<String>,
    /// Soft block: exactly one stage voted insecure at mid confidence
    pub warning: bool,
    /// Stages that actually completed, in execution order
    pub stages_used: Vec<StageKind>,
    pub total_elapsed: Duration,
}

impl Verdict {
    /// An allow verdict carrying no rationale
    pub fn allow(confidence: f64, stages_used: Vec<StageKind>, total_elapsed: Duration) -> Self {
        Self {
            secure: true,
            confidence,
            category: None,
            rationale: None,
            suggested_fix: None,
            warning: false,
            stages_used,
            total_elapsed,
        }
    }

    /// Whether a given stage completed for this verdict
    pub fn used_stage(&self, stage: StageKind) -> bool {
        self.stages_used.contains(&stage)
    }
}

/// Structured judgment returned by the semantic judge service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub secure: bool,
    pub category: Option<ThreatCategory>,
    /// Severity label as reported by the judge ("low".."critical")
    pub severity: Option<String>,
    pub confidence: f64,
    pub rationale: Option<String>,
    pub suggested_fix: Option<String>,
}

/// Timestamp pair carried by every pattern
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PatternTimestamps {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl PatternTimestamps {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            first_seen: now,
            last_seen: now,
        }
    }

    /// Advance `last_seen`, keeping it monotone
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_seen {
            self.last_seen = at;
        }
    }
}
