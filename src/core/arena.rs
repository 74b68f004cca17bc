// src/core/arena.rs — Racing arena: the generate → evaluate → refine loop
//
// Owns the race state. Agents, the evaluator, and the GPU bridge only
// return data; every partition move happens here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;

use super::abort::AbortHandle;
use super::events::RaceEvent;
use super::review::{ExpertReviewer, ReviewDecision};
use super::types::{
    GenerationContext, GpuValidationOutcome, Hypothesis, HypothesisStatus, LeaderboardEntry,
    Partition, RaceConfig, RaceResult, RaceState, RaceStatus, ResearchContext, TerminationReason,
};
use crate::agents::AgentPool;
use crate::bus::{
    FeedbackBus, FeedbackMessage, MessageType, Payload, Priority, PublishOptions, SubscriberScope,
    Target, TypeFilter,
};
use crate::evaluator::{
    build_leaderboard, generate_feedback, BreakthroughEvaluator, Evaluation, RefinementFeedback,
};
use crate::gpu::bridge::{GpuValidationBridge, ValidationOutcome};
use crate::history::HypothesisHistoryManager;
use crate::infra::errors::RaceError;
use crate::score::elimination::is_breakthrough_candidate;
use crate::score::{classify, clamp_overall};

/// Bus identity of the arena itself.
pub const ORCHESTRATOR_ID: &str = "orchestrator";

pub type EventCallback = Arc<dyn Fn(RaceEvent) + Send + Sync>;

type FeedbackInbox = Arc<Mutex<HashMap<String, RefinementFeedback>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RacingArena {
    config: RaceConfig,
    pool: AgentPool,
    evaluator: BreakthroughEvaluator,
    bus: FeedbackBus,
    gpu: Option<GpuValidationBridge>,
    reviewer: Option<Arc<dyn ExpertReviewer>>,
    history: Mutex<HypothesisHistoryManager>,
    listeners: Vec<EventCallback>,
    abort: AbortHandle,
    state: Mutex<RaceState>,
    inbox: FeedbackInbox,
    started: AtomicBool,
    next_seq: AtomicU64,
}

impl RacingArena {
    pub fn new(
        pool: AgentPool,
        evaluator: BreakthroughEvaluator,
        bus: FeedbackBus,
        config: RaceConfig,
    ) -> Self {
        let abort = AbortHandle::new();
        Self {
            state: Mutex::new(RaceState::new(config.max_iterations)),
            pool: pool.with_abort_handle(abort.clone()),
            evaluator: evaluator.with_abort_handle(abort.clone()),
            bus,
            gpu: None,
            reviewer: None,
            history: Mutex::new(HypothesisHistoryManager::default()),
            listeners: Vec::new(),
            abort,
            inbox: Arc::new(Mutex::new(HashMap::new())),
            started: AtomicBool::new(false),
            next_seq: AtomicU64::new(1),
            config,
        }
    }

    pub fn with_gpu(mut self, bridge: GpuValidationBridge) -> Self {
        self.gpu = Some(bridge);
        self
    }

    pub fn with_history(mut self, history: HypothesisHistoryManager) -> Self {
        self.history = Mutex::new(history);
        self
    }

    pub fn with_expert_reviewer(mut self, reviewer: Arc<dyn ExpertReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Register a progress listener. Listeners run inline on the race task.
    pub fn on_event(mut self, listener: impl Fn(RaceEvent) + Send + Sync + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Stop the race at the next checkpoint. In-flight agent calls see the
    /// signal through the shared handle.
    pub fn abort(&self) {
        tracing::info!("Race abort requested");
        self.abort.abort();
    }

    /// Snapshot of the race state.
    pub fn state(&self) -> RaceState {
        lock(&self.state).clone()
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        lock(&self.state).leaderboard.clone()
    }

    pub fn bus(&self) -> &FeedbackBus {
        &self.bus
    }

    pub fn history_summary(&self, hypothesis_id: &str) -> Option<String> {
        lock(&self.history).format_prompt_summary(hypothesis_id)
    }

    fn emit(&self, event: RaceEvent) {
        for listener in &self.listeners {
            listener(event.clone());
        }
    }

    fn emit_all(&self, events: Vec<RaceEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    fn set_status(&self, status: RaceStatus) {
        lock(&self.state).status = status;
    }

    fn publish(&self, target: Target, payload: Payload, priority: Priority, iteration: u32) {
        self.bus.publish(
            ORCHESTRATOR_ID,
            target,
            payload,
            PublishOptions {
                priority,
                iteration,
            },
        );
    }

    /// Run the race to completion. An arena runs exactly one race.
    pub async fn run_race(
        &self,
        research: ResearchContext,
        problem: &str,
    ) -> Result<RaceResult, RaceError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RaceError::RaceAlreadyRun);
        }

        let started_at = Utc::now();
        let timer = Instant::now();
        let race_id = {
            let mut state = lock(&self.state);
            state.started_at = Some(started_at);
            state.race_id.clone()
        };

        self.bus.start();
        let inbox = Arc::clone(&self.inbox);
        let subscription = self.bus.subscribe(
            SubscriberScope::Agent(ORCHESTRATOR_ID.to_string()),
            TypeFilter::only(MessageType::RefinementReady),
            Arc::new(move |msg: &FeedbackMessage| -> anyhow::Result<()> {
                if let Payload::RefinementReady(feedback) = &msg.payload {
                    lock(&inbox).insert(feedback.hypothesis_id.clone(), feedback.clone());
                }
                Ok(())
            }),
        );

        tracing::info!(
            race_id = %race_id,
            agents = self.pool.agent_count(),
            max_iterations = self.config.max_iterations,
            "Race started"
        );
        self.emit(RaceEvent::RaceStarted {
            race_id: race_id.clone(),
            max_iterations: self.config.max_iterations,
            agents: self.pool.agent_count(),
        });

        let outcome = self.run_iterations(&race_id, &research, problem).await;

        self.bus.unsubscribe(&subscription);
        self.cleanup().await;

        let finished_at = Utc::now();
        let duration_ms = timer.elapsed().as_millis() as u64;

        match outcome {
            Ok((termination, iterations_completed)) => {
                let result = {
                    let mut state = lock(&self.state);
                    let winners = select_winners(&mut state, self.config.winners_count);
                    state.status = RaceStatus::Complete;
                    state.finished_at = Some(finished_at);
                    RaceResult {
                        race_id: race_id.clone(),
                        winners,
                        leaderboard: state.leaderboard.clone(),
                        iterations_completed,
                        termination,
                        statistics: state.statistics.clone(),
                        started_at,
                        finished_at,
                        duration_ms,
                    }
                };
                tracing::info!(
                    race_id = %race_id,
                    iterations = iterations_completed,
                    winners = result.winners.len(),
                    termination = %termination,
                    duration_ms,
                    "Race complete"
                );
                self.emit(RaceEvent::RaceComplete {
                    race_id,
                    winners: result.winners.len(),
                    iterations: iterations_completed,
                    termination,
                    duration_ms,
                });
                Ok(result)
            }
            Err(e) => {
                {
                    let mut state = lock(&self.state);
                    state.status = RaceStatus::Error;
                    state.finished_at = Some(finished_at);
                }
                tracing::error!(race_id = %race_id, error = %e, "Race failed");
                self.emit(RaceEvent::RaceError {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn cleanup(&self) {
        self.bus.flush();
        self.bus.stop().await;
        if let Some(gpu) = &self.gpu {
            gpu.stop().await;
        }
    }

    async fn run_iterations(
        &self,
        race_id: &str,
        research: &ResearchContext,
        problem: &str,
    ) -> Result<(TerminationReason, u32), RaceError> {
        let max = self.config.max_iterations;
        let mut termination = TerminationReason::MaxIterations;
        let mut completed = 0;

        for iteration in 1..=max {
            if self.abort.is_aborted() {
                return Err(RaceError::Aborted);
            }
            lock(&self.state).current_iteration = iteration;
            self.emit(RaceEvent::IterationStarted {
                iteration,
                max_iterations: max,
            });
            self.publish(
                Target::Broadcast,
                Payload::RaceUpdate {
                    status: RaceStatus::Generating,
                    message: format!("iteration {iteration}/{max}"),
                },
                Priority::Low,
                iteration,
            );

            let ctx = GenerationContext {
                race_id: race_id.to_string(),
                research: research.clone(),
                problem: problem.to_string(),
                iteration,
                hypotheses_per_agent: self.config.hypotheses_per_agent,
            };

            let applied = if iteration == 1 {
                self.generate_phase(&ctx).await?;
                HashMap::new()
            } else {
                self.refine_phase(&ctx).await
            };

            let evaluations = self.evaluate_phase(problem, iteration, &applied).await;

            if let Some(gpu) = &self.gpu {
                self.gpu_phase(gpu, iteration).await;
            }

            if iteration < max {
                self.publish_feedback(iteration, &evaluations);
            }

            self.complete_iteration(iteration);
            completed = iteration;

            if let Some(reason) = self.check_termination() {
                termination = reason;
                break;
            }
        }

        if self.config.expert_review {
            self.expert_review_phase().await;
        }

        Ok((termination, completed))
    }

    // ─── Phases ─────────────────────────────────────────────────

    async fn generate_phase(&self, ctx: &GenerationContext) -> Result<(), RaceError> {
        self.set_status(RaceStatus::Generating);
        self.emit(RaceEvent::GenerationStarted {
            iteration: ctx.iteration,
            agents: self.pool.agent_count(),
        });

        let batch = self.pool.generate_all(ctx).await?;

        let mut events = Vec::new();
        {
            let mut state = lock(&self.state);
            for mut h in batch.hypotheses() {
                h.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                h.iteration = ctx.iteration;
                events.push(RaceEvent::HypothesisGenerated {
                    hypothesis_id: h.id.clone(),
                    agent_id: h.agent_id.clone(),
                    title: h.title.clone(),
                });
                state.insert_active(h);
                state.statistics.total_generated += 1;
            }
        }
        events.push(RaceEvent::GenerationComplete {
            iteration: ctx.iteration,
            generated: batch.total(),
            failed_agents: batch.failed_agents().iter().map(|s| s.to_string()).collect(),
            low_yield: batch.low_yield,
        });
        self.emit_all(events);
        Ok(())
    }

    /// Refine every active hypothesis that has feedback. Returns the feedback
    /// that was handed to agents, keyed by hypothesis id.
    async fn refine_phase(&self, ctx: &GenerationContext) -> HashMap<String, RefinementFeedback> {
        self.set_status(RaceStatus::Refining);
        self.bus.flush();
        let feedback = std::mem::take(&mut *lock(&self.inbox));

        let active = lock(&self.state).active_hypotheses();
        self.emit(RaceEvent::RefinementStarted {
            iteration: ctx.iteration,
            count: active.len(),
        });

        let refined = self.pool.refine_hypotheses(&active, &feedback, ctx).await;

        let margin = self.config.refinement_rejection_margin;
        let mut events = Vec::new();
        let (mut accepted, mut rejected) = (0, 0);
        {
            let mut state = lock(&self.state);
            for (original, mut candidate) in active.iter().zip(refined) {
                if candidate.id != original.id {
                    tracing::warn!(
                        hypothesis_id = %original.id,
                        returned_id = %candidate.id,
                        "Refinement returned a different hypothesis, keeping original"
                    );
                    continue;
                }
                if candidate.version <= original.version {
                    continue;
                }

                let before = self.evaluator.quick_evaluate(original).overall_score;
                let after = self.evaluator.quick_evaluate(&candidate).overall_score;
                if after < before - margin {
                    rejected += 1;
                    tracing::info!(
                        hypothesis_id = %original.id,
                        before,
                        after,
                        "Refinement regressed, keeping predecessor"
                    );
                    events.push(RaceEvent::RefinementRejected {
                        hypothesis_id: original.id.clone(),
                        predecessor_score: before,
                        refined_score: after,
                    });
                    continue;
                }

                accepted += 1;
                candidate.seq = original.seq;
                candidate.status = HypothesisStatus::Active;
                events.push(RaceEvent::HypothesisUpdated {
                    hypothesis_id: candidate.id.clone(),
                    version: candidate.version,
                });
                state.hypotheses.insert(candidate.id.clone(), candidate);
            }
            state.statistics.refinements_accepted += accepted;
            state.statistics.refinements_rejected += rejected;
        }
        events.push(RaceEvent::RefinementComplete {
            iteration: ctx.iteration,
            accepted,
            rejected,
        });
        self.emit_all(events);
        feedback
    }

    async fn evaluate_phase(
        &self,
        problem: &str,
        iteration: u32,
        applied: &HashMap<String, RefinementFeedback>,
    ) -> HashMap<String, Evaluation> {
        self.set_status(RaceStatus::Evaluating);
        let active = lock(&self.state).active_hypotheses();
        self.emit(RaceEvent::EvaluationStarted {
            iteration,
            count: active.len(),
        });

        let batch = self.evaluator.evaluate_batch(&active, problem, iteration).await;

        let mut events = Vec::new();
        {
            let mut state = lock(&self.state);
            for h in &batch.scored {
                state.hypotheses.insert(h.id.clone(), h.clone());
            }
            {
                let mut history = lock(&self.history);
                for h in &batch.scored {
                    history.record_iteration(h, applied.get(&h.id));
                }
            }

            for id in &batch.breakthrough_candidates {
                state.move_to(id, Partition::BreakthroughCandidate);
                state.statistics.total_breakthroughs += 1;
                if let Some(h) = state.hypotheses.get(id) {
                    let score = h.overall_score();
                    tracing::info!(hypothesis_id = %id, score, "Breakthrough candidate");
                    self.publish(
                        Target::Broadcast,
                        Payload::BreakthroughFound {
                            hypothesis_id: id.clone(),
                            score,
                        },
                        Priority::Critical,
                        iteration,
                    );
                    events.push(RaceEvent::BreakthroughFound {
                        hypothesis_id: id.clone(),
                        title: h.title.clone(),
                        score,
                    });
                }
            }

            for elim in &batch.eliminated {
                state.move_to(&elim.id, Partition::Eliminated);
                if let Some(h) = state.hypotheses.get_mut(&elim.id) {
                    h.eliminated_reason = Some(elim.reason.clone());
                }
                state.statistics.total_eliminated += 1;
                self.publish(
                    Target::Broadcast,
                    Payload::HypothesisEliminated {
                        hypothesis_id: elim.id.clone(),
                        score: elim.score,
                        reason: elim.reason.clone(),
                    },
                    Priority::High,
                    iteration,
                );
                events.push(RaceEvent::HypothesisEliminated {
                    hypothesis_id: elim.id.clone(),
                    score: elim.score,
                    reason: elim.reason.clone(),
                });
            }

            for eval in &batch.evaluations {
                self.publish(
                    Target::Broadcast,
                    Payload::EvaluationComplete {
                        hypothesis_id: eval.hypothesis_id.clone(),
                        overall_score: eval.overall_score,
                        classification: eval.classification,
                    },
                    Priority::Normal,
                    iteration,
                );
            }

            let deltas: HashMap<String, f64> = batch
                .evaluations
                .iter()
                .filter_map(|e| e.score_delta.map(|d| (e.hypothesis_id.clone(), d)))
                .collect();
            refresh_leaderboard(&mut state, &deltas);
        }

        let scores: Vec<f64> = batch.evaluations.iter().map(|e| e.overall_score).collect();
        let best_score = scores.iter().copied().fold(0.0, f64::max);
        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        events.push(RaceEvent::EvaluationComplete {
            iteration,
            evaluated: batch.evaluations.len(),
            best_score,
            average_score,
        });
        self.emit_all(events);

        batch
            .evaluations
            .into_iter()
            .map(|e| (e.hypothesis_id.clone(), e))
            .collect()
    }

    async fn gpu_phase(&self, gpu: &GpuValidationBridge, iteration: u32) {
        if !gpu.is_due(iteration) {
            return;
        }
        let active = lock(&self.state).active_hypotheses();
        self.emit(RaceEvent::ValidationStarted {
            iteration,
            eligible: gpu.select_eligible(&active).len(),
        });

        let outcome = gpu.validate_iteration(&active, iteration).await;
        let validated = outcome.validated_count();
        let threshold = self.config.breakthrough_threshold;

        let mut events = Vec::new();
        let (skipped, cost_usd, note) = {
            let mut state = lock(&self.state);
            match outcome {
                ValidationOutcome::Skipped { reason } => {
                    tracing::info!(iteration, reason = %reason, "GPU validation skipped");
                    (true, 0.0, Some(reason))
                }
                ValidationOutcome::Failed {
                    unvalidated, error, ..
                } => {
                    for id in &unvalidated {
                        if let Some(h) = state.hypotheses.get_mut(id) {
                            h.gpu_validation = Some(GpuValidationOutcome::Unvalidated {
                                reason: error.clone(),
                            });
                        }
                    }
                    (false, 0.0, Some(error))
                }
                ValidationOutcome::Completed {
                    results,
                    adjustments,
                    total_cost,
                    ..
                } => {
                    let adjustments: HashMap<String, f64> = adjustments.into_iter().collect();
                    let mut promoted = Vec::new();
                    for result in results {
                        let id = result.hypothesis_id.clone();
                        let adjustment = adjustments.get(&id).copied().unwrap_or(0.0);
                        let Some(h) = state.hypotheses.get_mut(&id) else {
                            continue;
                        };
                        if let Some(scores) = h.scores.as_mut() {
                            scores.gpu_adjustment = adjustment;
                            scores.overall = clamp_overall(scores.dimension_points() + adjustment);
                            scores.classification = classify(scores.overall, &scores.dimensions);
                            if is_breakthrough_candidate(
                                scores.overall,
                                scores.classification,
                                threshold,
                            ) {
                                promoted.push((id.clone(), h.title.clone(), scores.overall));
                            }
                        }
                        h.gpu_validation = Some(GpuValidationOutcome::Validated(result));
                        h.updated_at = Utc::now();
                    }
                    for (id, title, score) in promoted {
                        state.move_to(&id, Partition::BreakthroughCandidate);
                        state.statistics.total_breakthroughs += 1;
                        self.publish(
                            Target::Broadcast,
                            Payload::BreakthroughFound {
                                hypothesis_id: id.clone(),
                                score,
                            },
                            Priority::Critical,
                            iteration,
                        );
                        events.push(RaceEvent::BreakthroughFound {
                            hypothesis_id: id,
                            title,
                            score,
                        });
                    }
                    state.statistics.gpu_validations += validated;
                    state.statistics.gpu_cost_usd += total_cost;
                    (false, total_cost, None)
                }
            }
        };
        {
            let mut state = lock(&self.state);
            let deltas = current_deltas(&state);
            refresh_leaderboard(&mut state, &deltas);
        }

        self.publish(
            Target::Broadcast,
            Payload::GpuValidationComplete { validated, skipped },
            Priority::Normal,
            iteration,
        );
        events.push(RaceEvent::ValidationComplete {
            iteration,
            validated,
            skipped,
            cost_usd,
            note,
        });
        self.emit_all(events);
    }

    /// Queue refinement feedback for every surviving hypothesis. The owning
    /// agent and the arena both receive it.
    fn publish_feedback(&self, iteration: u32, evaluations: &HashMap<String, Evaluation>) {
        let active = lock(&self.state).active_hypotheses();
        let history = lock(&self.history);
        for h in &active {
            let Some(eval) = evaluations.get(&h.id) else {
                continue;
            };
            let mut feedback = generate_feedback(eval, history.format_prompt_summary(&h.id));
            feedback.overall_score = h.overall_score();
            self.publish(
                Target::Agents(vec![h.agent_id.clone(), ORCHESTRATOR_ID.to_string()]),
                Payload::RefinementReady(feedback),
                Priority::High,
                iteration,
            );
        }
    }

    fn complete_iteration(&self, iteration: u32) {
        let (active, eliminated, breakthroughs, best_score) = {
            let state = lock(&self.state);
            (
                state.active.len(),
                state.eliminated.len(),
                state.breakthrough_candidates.len(),
                state.statistics.best_score,
            )
        };
        self.publish(
            Target::Broadcast,
            Payload::IterationComplete {
                iteration,
                active,
                eliminated,
                breakthroughs,
            },
            Priority::Normal,
            iteration,
        );
        tracing::info!(iteration, active, eliminated, breakthroughs, best_score, "Iteration complete");
        self.emit(RaceEvent::IterationComplete {
            iteration,
            active,
            eliminated,
            breakthroughs,
            best_score,
        });
    }

    /// Stop early when nothing is left to refine, or when enough candidates
    /// clear the breakthrough bar.
    fn check_termination(&self) -> Option<TerminationReason> {
        let state = lock(&self.state);
        if state.active.is_empty() {
            return Some(TerminationReason::NoActiveHypotheses);
        }
        let candidates = &state.breakthrough_candidates;
        if !candidates.is_empty()
            && candidates.len() >= self.config.winners_count
            && candidates.iter().all(|id| {
                state
                    .hypotheses
                    .get(id)
                    .is_some_and(|h| h.overall_score() >= self.config.breakthrough_threshold)
            })
        {
            return Some(TerminationReason::WinnersFound);
        }
        None
    }

    async fn expert_review_phase(&self) {
        let Some(reviewer) = &self.reviewer else {
            tracing::warn!("Expert review enabled but no reviewer configured");
            return;
        };
        self.set_status(RaceStatus::AwaitingExpertReview);

        let top: Vec<Hypothesis> = {
            let state = lock(&self.state);
            state
                .leaderboard
                .iter()
                .filter(|e| e.status == HypothesisStatus::Active)
                .take(self.config.expert_review_top_n)
                .filter_map(|e| state.hypotheses.get(&e.hypothesis_id).cloned())
                .collect()
        };
        if top.is_empty() {
            return;
        }
        self.emit(RaceEvent::ExpertReviewRequested { count: top.len() });

        let reviews = match reviewer.review(&top).await {
            Ok(reviews) => reviews,
            Err(e) => {
                tracing::warn!(error = %e, "Expert review failed, continuing without it");
                return;
            }
        };

        let (mut approved, mut rejected, mut refined) = (0, 0, 0);
        {
            let mut state = lock(&self.state);
            for review in reviews {
                let id = review.hypothesis_id;
                if !state.active.contains(&id) {
                    tracing::debug!(hypothesis_id = %id, "Review for non-active hypothesis ignored");
                    continue;
                }
                match review.decision {
                    ReviewDecision::Approve => {
                        state.move_to(&id, Partition::BreakthroughCandidate);
                        state.statistics.total_breakthroughs += 1;
                        approved += 1;
                    }
                    ReviewDecision::Reject { reason } => {
                        state.move_to(&id, Partition::Eliminated);
                        if let Some(h) = state.hypotheses.get_mut(&id) {
                            h.eliminated_reason = Some(format!("Expert review: {reason}"));
                        }
                        state.statistics.total_eliminated += 1;
                        rejected += 1;
                    }
                    ReviewDecision::Refine { suggestions } => {
                        if let Some(h) = state.hypotheses.get_mut(&id) {
                            h.refinement_suggestions.extend(suggestions);
                        }
                        refined += 1;
                    }
                }
            }
            let deltas = current_deltas(&state);
            refresh_leaderboard(&mut state, &deltas);
        }
        self.emit(RaceEvent::ExpertReviewComplete {
            approved,
            rejected,
            refined,
        });
    }
}

// ─── State helpers ──────────────────────────────────────────────

fn current_deltas(state: &RaceState) -> HashMap<String, f64> {
    state
        .leaderboard
        .iter()
        .filter_map(|e| e.score_delta.map(|d| (e.hypothesis_id.clone(), d)))
        .collect()
}

/// Rebuild the leaderboard and the score statistics from the table.
fn refresh_leaderboard(state: &mut RaceState, deltas: &HashMap<String, f64>) {
    state.leaderboard = build_leaderboard(state.hypotheses.values(), deltas);
    let scores: Vec<f64> = state
        .leaderboard
        .iter()
        .filter(|e| e.classification.is_some())
        .map(|e| e.overall_score)
        .collect();
    state.statistics.best_score = scores.iter().copied().fold(0.0, f64::max);
    state.statistics.average_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
}

/// Breakthrough candidates first, then the best remaining active
/// hypotheses, each group in leaderboard order.
fn select_winners(state: &mut RaceState, count: usize) -> Vec<Hypothesis> {
    let ordered: Vec<String> = state
        .leaderboard
        .iter()
        .filter(|e| e.status == HypothesisStatus::Breakthrough)
        .chain(
            state
                .leaderboard
                .iter()
                .filter(|e| e.status == HypothesisStatus::Active),
        )
        .map(|e| e.hypothesis_id.clone())
        .take(count)
        .collect();

    ordered
        .iter()
        .filter_map(|id| {
            let h = state.hypotheses.get_mut(id)?;
            h.status = HypothesisStatus::Winner;
            Some(h.clone())
        })
        .collect()
}
