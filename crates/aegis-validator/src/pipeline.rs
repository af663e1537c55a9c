//! The validation pipeline: tier-driven stage orchestration
//!
//! One `Validator` per process, shared by handle. Each request runs the
//! fast matcher, then (tier permitting) the behavioral classifier, then
//! the semantic judge, exiting as early as the tier's policy allows. The
//! judge failing or timing out is a non-vote, never a caller error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aegis_template::TemplateContext;
use aegis_types::{
    AegisError, AegisResult, SecurityTier, StageKind, StageResult, ValidationRequest, Verdict,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::fusion;
use crate::learner::AdaptiveLearner;
use crate::patterns::store::PatternStore;
use crate::stages::classifier::BehavioralClassifier;
use crate::stages::fast::FastMatcher;
use crate::stages::judge::{HttpJudgeBackend, JudgeBackend, SemanticJudge};
use crate::tiers::{JudgeMode, TierPolicy, VETO_CONFIDENCE};

/// Requests between opportunistic decay sweeps
const DECAY_CHECK_EVERY: u64 = 512;

/// Shared pipeline front-end
pub struct Validator {
    config: ValidatorConfig,
    store: PatternStore,
    learner: AdaptiveLearner,
    fast: FastMatcher,
    classifier: BehavioralClassifier,
    judge: Option<SemanticJudge>,
    request_count: AtomicU64,
}

impl Validator {
    /// Build a validator over the built-in seed corpus
    pub fn new(config: ValidatorConfig) -> AegisResult<Self> {
        let judge = Self::build_judge(&config)?;
        Ok(Self::assemble(config, PatternStore::with_seed_patterns(), judge))
    }

    /// Build a validator, restoring persisted pattern state when a snapshot
    /// exists at the configured path
    pub async fn load(config: ValidatorConfig) -> AegisResult<Self> {
        let judge = Self::build_judge(&config)?;
        let store = match config.snapshot_path {
            Some(ref path) if path.exists() => PatternStore::load_snapshot(path).await?,
            _ => PatternStore::with_seed_patterns(),
        };
        Ok(Self::assemble(config, store, judge))
    }

    /// Build a validator with an explicit judge backend (tests, embedded
    /// deployments with their own transport)
    pub fn with_judge_backend(config: ValidatorConfig, backend: Arc<dyn JudgeBackend>) -> Self {
        let judge = SemanticJudge::new(backend, config.judge_timeout(), config.judge_depth);
        Self::assemble(config, PatternStore::with_seed_patterns(), Some(judge))
    }

    fn build_judge(config: &ValidatorConfig) -> AegisResult<Option<SemanticJudge>> {
        if !config.judge_enabled {
            return Ok(None);
        }
        if config.judge_base_url.trim().is_empty() {
            return Err(AegisError::Config(
                "judge is enabled but judge_base_url is empty".to_string(),
            ));
        }
        let backend = Arc::new(HttpJudgeBackend::new(
            config.judge_base_url.clone(),
            config.judge_model.clone(),
            config.judge_api_key.clone(),
        ));
        Ok(Some(SemanticJudge::new(
            backend,
            config.judge_timeout(),
            config.judge_depth,
        )))
    }

    fn assemble(config: ValidatorConfig, store: PatternStore, judge: Option<SemanticJudge>) -> Self {
        Self {
            config,
            learner: AdaptiveLearner::new(store.clone()),
            store,
            fast: FastMatcher::new(),
            classifier: BehavioralClassifier::new(),
            judge,
            request_count: AtomicU64::new(0),
        }
    }

    /// Validate one piece of text at the given tier
    pub async fn validate(
        &self,
        text: &str,
        content_type: &str,
        actor_id: &str,
        tier: SecurityTier,
    ) -> AegisResult<Verdict> {
        let request = ValidationRequest::new(text, content_type, actor_id, tier);
        self.run(request).await
    }

    /// Run the full pipeline for a request
    pub async fn run(&self, request: ValidationRequest) -> AegisResult<Verdict> {
        let start = Instant::now();
        let policy = TierPolicy::for_tier(request.tier);
        self.maybe_decay();

        let mut results: Vec<StageResult> = Vec::with_capacity(3);

        // Stage 1: fast matcher, always
        let fast = self.fast.evaluate(&request.text, &self.store.snapshot());
        let fast_blocks = !fast.secure && fast.confidence >= policy.block_cutoff;
        results.push(fast);

        if fast_blocks {
            // A confident known-pattern hit needs no second opinion
            let verdict = self.finish(&request, results, &policy, start);
            return Ok(verdict);
        }

        // Stage 2: behavioral classifier
        if policy.run_classifier {
            let classify = self
                .classifier
                .evaluate(&request.text, policy.anomaly_cutoff);
            results.push(classify);
        }

        // Stage 3: semantic judge
        let run_judge = judge_required(&policy, &results);
        if run_judge {
            if let Some(ref judge) = self.judge {
                match judge.evaluate(&request.text, &request.content_type).await {
                    Ok(result) => results.push(result),
                    // Non-vote: fuse whatever completed
                    Err(e) => warn!(actor = %request.actor_id, error = %e, "judge stage skipped"),
                }
            } else {
                debug!("judge stage requested by tier but not configured");
            }
        }

        Ok(self.finish(&request, results, &policy, start))
    }

    fn finish(
        &self,
        request: &ValidationRequest,
        results: Vec<StageResult>,
        policy: &TierPolicy,
        start: Instant,
    ) -> Verdict {
        let verdict = fusion::fuse(&results, policy, start.elapsed());
        if verdict.secure {
            debug!(
                actor = %request.actor_id,
                tier = %request.tier,
                stages = verdict.stages_used.len(),
                "request allowed"
            );
        } else {
            info!(
                actor = %request.actor_id,
                tier = %request.tier,
                category = ?verdict.category,
                confidence = verdict.confidence,
                warning = verdict.warning,
                "request blocked"
            );
            self.learner
                .observe(request, &verdict, fusion::deciding_stage(&results, &verdict));
        }
        verdict
    }

    /// Resolve `{placeholder}` and select-block syntax before validation
    pub fn resolve_template(&self, template: &str, context: &TemplateContext) -> String {
        aegis_template::resolve_bounded(template, context, self.config.max_template_passes)
    }

    /// Periodic confidence decay piggybacked on request traffic, for
    /// deployments that never spawn the background task
    fn maybe_decay(&self) {
        let n = self.request_count.fetch_add(1, Ordering::Relaxed);
        if n > 0 && n % DECAY_CHECK_EVERY == 0 {
            self.store.apply_decay(self.config.decay_half_life());
        }
    }

    /// Spawn the background decay loop; the handle aborts it on drop sites
    /// that care
    pub fn spawn_decay_task(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let half_life = self.config.decay_half_life();
        let interval = self.config.decay_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick is immediate
            loop {
                ticker.tick().await;
                let decayed = store.apply_decay(half_life);
                if decayed > 0 {
                    debug!(decayed, "background decay sweep");
                }
            }
        })
    }

    /// Persist the pattern store to the configured snapshot path
    pub async fn persist(&self) -> AegisResult<()> {
        match self.config.snapshot_path {
            Some(ref path) => self.store.save_snapshot(path).await,
            None => Ok(()),
        }
    }

    pub fn pattern_store(&self) -> &PatternStore {
        &self.store
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }
}

/// Whether the judge stage should run given the earlier stage votes.
///
/// For inconclusive-only tiers the classifier can end the pipeline alone:
/// both stages clearing with a low anomaly score, or an insecure classifier
/// vote at veto strength (whose block stands no matter what the judge says).
fn judge_required(policy: &TierPolicy, results: &[StageResult]) -> bool {
    match policy.judge_mode {
        JudgeMode::Never => false,
        JudgeMode::Always => true,
        JudgeMode::OnInconclusive => {
            let fast_secure = results
                .iter()
                .find(|r| r.stage == StageKind::Fast)
                .is_some_and(|r| r.secure);
            let Some(classify) = results.iter().find(|r| r.stage == StageKind::Classify) else {
                return true;
            };
            if classify.secure {
                let score = 1.0 - classify.confidence;
                !(fast_secure && score <= policy.clear_threshold)
            } else {
                classify.confidence < VETO_CONFIDENCE
            }
        }
    }
}
