// src/evaluator/mod.rs — Breakthrough evaluator: score, classify, rank, partition

pub mod cache;
pub mod feedback;
pub mod judge;
pub mod leaderboard;
pub mod parser;
pub mod scorers;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::core::abort::AbortHandle;
use crate::core::types::{Hypothesis, HypothesisScores, HypothesisStatus, LeaderboardEntry};
use crate::infra::config::Config;
use crate::infra::errors::RaceError;
use crate::provider::{retry_with_timeout, RetryPolicy};
use crate::score::elimination::{is_breakthrough_candidate, Elimination, EliminationCandidate};
use crate::score::{
    classify, overall_from, Classification, DimensionId, DimensionScore, EliminationPolicy,
    BREAKTHROUGH_THRESHOLD,
};
use cache::{StructuredFieldCache, StructuredFieldPolicy};
use judge::DimensionJudge;

pub use feedback::{generate_feedback, RefinementFeedback};
pub use leaderboard::build_leaderboard;

const FOCUS_COUNT: usize = 3;

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Evaluations in flight at once within a batch.
    pub max_concurrency: usize,
    pub use_judge: bool,
    pub structured_fields: StructuredFieldPolicy,
    pub elimination: EliminationPolicy,
    pub breakthrough_threshold: f64,
    /// Applied to each judge call before falling back to deterministic scores.
    pub judge_retry: RetryPolicy,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            use_judge: true,
            structured_fields: StructuredFieldPolicy::Recompute,
            elimination: EliminationPolicy::default(),
            breakthrough_threshold: BREAKTHROUGH_THRESHOLD,
            judge_retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for EvaluatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.evaluator.max_concurrency,
            use_judge: config.evaluator.use_judge,
            structured_fields: config.evaluator.structured_fields,
            elimination: EliminationPolicy::default(),
            breakthrough_threshold: config.race.breakthrough_threshold,
            judge_retry: RetryPolicy::from(&config.evaluator),
        }
    }
}

/// Result of scoring one hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub hypothesis_id: String,
    pub iteration: u32,
    pub overall_score: f64,
    pub dimensions: BTreeMap<DimensionId, DimensionScore>,
    pub classification: Classification,
    pub passed: Vec<DimensionId>,
    pub failed: Vec<DimensionId>,
    pub weakest: Vec<DimensionId>,
    pub strongest: Vec<DimensionId>,
    pub previous_score: Option<f64>,
    pub score_delta: Option<f64>,
    pub recommendations: Vec<String>,
    /// False when deterministic scorers produced the dimensions.
    pub judged: bool,
    pub evaluated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn to_scores(&self) -> HypothesisScores {
        HypothesisScores {
            overall: self.overall_score,
            dimensions: self.dimensions.clone(),
            gpu_adjustment: 0.0,
            classification: self.classification,
            evaluated_iteration: self.iteration,
        }
    }
}

/// Outcome of evaluating the active set for one iteration.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub evaluations: Vec<Evaluation>,
    /// Input hypotheses with fresh scores and partition statuses applied.
    pub scored: Vec<Hypothesis>,
    pub active: Vec<String>,
    pub eliminated: Vec<Elimination>,
    pub breakthrough_candidates: Vec<String>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

pub struct BreakthroughEvaluator {
    config: EvaluatorConfig,
    judge: Option<Arc<dyn DimensionJudge>>,
    cache: StructuredFieldCache,
    abort: AbortHandle,
}

impl BreakthroughEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        let cache = StructuredFieldCache::new(config.structured_fields);
        Self {
            config,
            judge: None,
            cache,
            abort: AbortHandle::new(),
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn DimensionJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Judge retries stop when the race is aborted.
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Score a hypothesis on every dimension. Never fails: a judge error
    /// falls back to the deterministic scorers.
    pub async fn evaluate_hypothesis(
        &self,
        hypothesis: &Hypothesis,
        problem: &str,
        iteration: u32,
    ) -> Evaluation {
        let mut judged = false;
        let mut dimensions = match self.judge.as_ref().filter(|_| self.config.use_judge) {
            Some(judge) => match self.judge_with_retry(judge, hypothesis, problem).await {
                Ok(scores) => {
                    judged = true;
                    complete_dimensions(scores, hypothesis, problem)
                }
                Err(e) => {
                    tracing::warn!(
                        hypothesis_id = %hypothesis.id,
                        error = %e,
                        "Judge failed, using deterministic scores"
                    );
                    scorers::score_all(hypothesis, problem)
                }
            },
            None => scorers::score_all(hypothesis, problem),
        };

        self.cache
            .apply(&hypothesis.id, hypothesis.version, &mut dimensions);
        build_evaluation(hypothesis, iteration, dimensions, judged)
    }

    async fn judge_with_retry(
        &self,
        judge: &Arc<dyn DimensionJudge>,
        hypothesis: &Hypothesis,
        problem: &str,
    ) -> Result<BTreeMap<DimensionId, DimensionScore>, RaceError> {
        let signal = self.abort.signal();
        retry_with_timeout(
            &self.config.judge_retry,
            &signal,
            &format!("judge {}", hypothesis.id),
            move |_attempt| judge.judge(hypothesis, problem),
        )
        .await
    }

    /// Deterministic triage only; no judge call and no cache.
    pub fn quick_evaluate(&self, hypothesis: &Hypothesis) -> Evaluation {
        let dimensions = scorers::score_all(hypothesis, "");
        build_evaluation(hypothesis, hypothesis.iteration, dimensions, false)
    }

    /// Evaluate a batch with bounded concurrency, then partition it into
    /// breakthrough candidates, eliminations, and survivors.
    pub async fn evaluate_batch(
        &self,
        hypotheses: &[Hypothesis],
        problem: &str,
        iteration: u32,
    ) -> BatchResult {
        let evaluations: Vec<Evaluation> = stream::iter(
            hypotheses
                .iter()
                .map(|h| self.evaluate_hypothesis(h, problem, iteration)),
        )
        .buffered(self.config.max_concurrency.max(1))
        .collect()
        .await;

        let mut scored: Vec<Hypothesis> = hypotheses.to_vec();
        let mut breakthrough_candidates = Vec::new();
        let mut remaining = Vec::new();

        for (h, eval) in scored.iter_mut().zip(&evaluations) {
            apply_evaluation(h, eval);
            if is_breakthrough_candidate(
                eval.overall_score,
                eval.classification,
                self.config.breakthrough_threshold,
            ) {
                h.status = HypothesisStatus::Breakthrough;
                breakthrough_candidates.push(h.id.clone());
            } else {
                remaining.push(EliminationCandidate {
                    id: h.id.clone(),
                    score: eval.overall_score,
                    seq: h.seq,
                });
            }
        }

        let eliminated =
            self.config
                .elimination
                .select_eliminations(&remaining, iteration, remaining.len());
        for elim in &eliminated {
            if let Some(h) = scored.iter_mut().find(|h| h.id == elim.id) {
                h.status = HypothesisStatus::Eliminated;
                h.eliminated_reason = Some(elim.reason.clone());
            }
        }
        let active: Vec<String> = remaining
            .iter()
            .filter(|c| !eliminated.iter().any(|e| e.id == c.id))
            .map(|c| c.id.clone())
            .collect();

        let deltas: HashMap<String, f64> = evaluations
            .iter()
            .filter_map(|e| e.score_delta.map(|d| (e.hypothesis_id.clone(), d)))
            .collect();
        let leaderboard = build_leaderboard(&scored, &deltas);

        tracing::info!(
            iteration,
            evaluated = evaluations.len(),
            active = active.len(),
            eliminated = eliminated.len(),
            breakthroughs = breakthrough_candidates.len(),
            "Batch evaluated"
        );

        BatchResult {
            evaluations,
            scored,
            active,
            eliminated,
            breakthrough_candidates,
            leaderboard,
        }
    }
}

/// Store an evaluation's scores on the hypothesis.
pub fn apply_evaluation(hypothesis: &mut Hypothesis, evaluation: &Evaluation) {
    hypothesis.scores = Some(evaluation.to_scores());
    hypothesis.updated_at = evaluation.evaluated_at;
}

/// Judges may omit dimensions; fill any hole from the deterministic scorers.
fn complete_dimensions(
    mut scores: BTreeMap<DimensionId, DimensionScore>,
    hypothesis: &Hypothesis,
    problem: &str,
) -> BTreeMap<DimensionId, DimensionScore> {
    for d in DimensionId::ALL {
        if !scores.contains_key(&d) {
            scores.insert(d, scorers::score_dimension(d, hypothesis, problem));
        }
    }
    scores
}

fn build_evaluation(
    hypothesis: &Hypothesis,
    iteration: u32,
    dimensions: BTreeMap<DimensionId, DimensionScore>,
    judged: bool,
) -> Evaluation {
    let overall_score = overall_from(&dimensions);
    let classification = classify(overall_score, &dimensions);

    let (passed, failed): (Vec<_>, Vec<_>) = dimensions
        .values()
        .map(|s| (s.dimension, s.passed()))
        .partition(|(_, ok)| *ok);
    let passed = passed.into_iter().map(|(d, _)| d).collect();
    let failed = failed.into_iter().map(|(d, _)| d).collect();

    let mut ordered: Vec<&DimensionScore> = dimensions.values().collect();
    ordered.sort_by(|a, b| a.percentage.total_cmp(&b.percentage));
    let weakest: Vec<DimensionId> = ordered
        .iter()
        .take(FOCUS_COUNT)
        .map(|s| s.dimension)
        .collect();
    ordered.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
    let strongest = ordered
        .iter()
        .take(FOCUS_COUNT)
        .map(|s| s.dimension)
        .collect();

    let recommendations = weakest
        .iter()
        .filter_map(|d| dimensions.get(d))
        .map(|s| {
            let def = s.dimension.def();
            match s.gaps.first() {
                Some(gap) => format!("{}: {}", def.name, gap),
                None => format!("{}: {}", def.name, def.description),
            }
        })
        .collect();

    let previous_score = hypothesis.scores.as_ref().map(|s| s.overall);

    Evaluation {
        hypothesis_id: hypothesis.id.clone(),
        iteration,
        overall_score,
        dimensions,
        classification,
        passed,
        failed,
        weakest,
        strongest,
        previous_score,
        score_delta: previous_score.map(|p| overall_score - p),
        recommendations,
        judged,
        evaluated_at: Utc::now(),
    }
}
