//! Validator configuration
//!
//! All fields carry serde defaults so a partial (or empty) config
//! deserializes to a working setup.

use std::path::PathBuf;
use std::time::Duration;

use aegis_types::AnalysisDepth;
use serde::{Deserialize, Serialize};

/// Configuration for the validation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Base URL of the OpenAI-compatible endpoint backing the semantic judge
    #[serde(default = "default_judge_base_url")]
    pub judge_base_url: String,

    /// Model identifier sent with judge requests
    #[serde(default = "default_judge_model")]
    pub judge_model: String,

    /// Optional bearer token for the judge endpoint
    #[serde(default)]
    pub judge_api_key: Option<String>,

    /// Whether the semantic judge stage is available at all
    #[serde(default = "default_true")]
    pub judge_enabled: bool,

    /// Wall-clock budget for a single judge call; on expiry the stage
    /// becomes a non-vote
    #[serde(default = "default_judge_timeout_secs")]
    pub judge_timeout_secs: u64,

    /// Analysis depth requested from the judge
    #[serde(default)]
    pub judge_depth: AnalysisDepth,

    /// Half-life for exponential confidence decay of stale patterns
    #[serde(default = "default_decay_half_life_secs")]
    pub decay_half_life_secs: u64,

    /// How often the background decay task wakes up
    #[serde(default = "default_decay_interval_secs")]
    pub decay_interval_secs: u64,

    /// Where the pattern store snapshot is persisted; None disables
    /// persistence
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: Option<PathBuf>,

    /// Cap on template resolution passes
    #[serde(default = "default_max_template_passes")]
    pub max_template_passes: usize,
}

fn default_judge_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_judge_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_true() -> bool {
    true
}

fn default_judge_timeout_secs() -> u64 {
    20
}

fn default_decay_half_life_secs() -> u64 {
    // 7 days
    7 * 24 * 3600
}

fn default_decay_interval_secs() -> u64 {
    3600
}

fn default_snapshot_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("aegis").join("patterns.json"))
}

fn default_max_template_passes() -> usize {
    aegis_template::DEFAULT_MAX_PASSES
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            judge_base_url: default_judge_base_url(),
            judge_model: default_judge_model(),
            judge_api_key: None,
            judge_enabled: default_true(),
            judge_timeout_secs: default_judge_timeout_secs(),
            judge_depth: AnalysisDepth::default(),
            decay_half_life_secs: default_decay_half_life_secs(),
            decay_interval_secs: default_decay_interval_secs(),
            snapshot_path: default_snapshot_path(),
            max_template_passes: default_max_template_passes(),
        }
    }
}

impl ValidatorConfig {
    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs)
    }

    pub fn decay_half_life(&self) -> Duration {
        Duration::from_secs(self.decay_half_life_secs)
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs(self.decay_interval_secs)
    }
}
