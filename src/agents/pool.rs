// src/agents/pool.rs — Run generator agents concurrently with retry and timeout
//
// Every launched call is awaited to completion before a phase returns, so a
// slow agent's result is never dropped because a faster one finished first.

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Semaphore;

use super::GeneratorAgent;
use crate::core::abort::AbortHandle;
use crate::core::types::{AgentLifecycle, AgentStatus, GenerationContext, Hypothesis};
use crate::evaluator::RefinementFeedback;
use crate::infra::config::Config;
use crate::infra::errors::RaceError;
use crate::provider::{retry_with_timeout, RetryPolicy};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Agent calls in flight at once across the pool.
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    /// Below this total the batch is flagged as low-yield.
    pub min_total_hypotheses: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            retry: RetryPolicy::default(),
            min_total_hypotheses: 3,
        }
    }
}

impl From<&Config> for PoolConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.agents.max_concurrency,
            retry: RetryPolicy::from(&config.agents),
            min_total_hypotheses: config.agents.min_total_hypotheses,
        }
    }
}

/// One agent's share of a generation phase.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    pub agent_id: String,
    pub hypotheses: Vec<Hypothesis>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AgentRunResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct GenerationBatch {
    pub results: Vec<AgentRunResult>,
    pub hypotheses_by_agent: BTreeMap<String, Vec<Hypothesis>>,
    pub total_time_ms: u64,
    pub low_yield: bool,
}

impl GenerationBatch {
    pub fn total(&self) -> usize {
        self.results.iter().map(|r| r.hypotheses.len()).sum()
    }

    /// All hypotheses in agent order.
    pub fn hypotheses(&self) -> Vec<Hypothesis> {
        self.results
            .iter()
            .flat_map(|r| r.hypotheses.iter().cloned())
            .collect()
    }

    pub fn failed_agents(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.agent_id.as_str())
            .collect()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AgentPool {
    agents: Vec<Arc<dyn GeneratorAgent>>,
    config: PoolConfig,
    permits: Semaphore,
    statuses: Mutex<HashMap<String, AgentStatus>>,
    abort: AbortHandle,
}

impl AgentPool {
    pub fn new(agents: Vec<Arc<dyn GeneratorAgent>>, config: PoolConfig) -> Self {
        let statuses = agents
            .iter()
            .map(|a| (a.id().to_string(), AgentStatus::new(a.id(), a.source())))
            .collect();
        Self {
            permits: Semaphore::new(config.max_concurrency.max(1)),
            agents,
            config,
            statuses: Mutex::new(statuses),
            abort: AbortHandle::new(),
        }
    }

    /// Share an abort handle with the caller (the arena aborts the race and
    /// the pool with one signal).
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort(&self) {
        tracing::info!("Agent pool abort requested");
        self.abort.abort();
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Status snapshot in agent order.
    pub fn statuses(&self) -> Vec<AgentStatus> {
        let statuses = lock(&self.statuses);
        self.agents
            .iter()
            .filter_map(|a| statuses.get(a.id()).cloned())
            .collect()
    }

    fn update_status(&self, agent_id: &str, f: impl FnOnce(&mut AgentStatus)) {
        if let Some(status) = lock(&self.statuses).get_mut(agent_id) {
            f(status);
        }
    }

    /// Run every agent's `generate` concurrently.
    ///
    /// Fails only when no agent produced anything: `Aborted` if the race was
    /// aborted, otherwise `AllAgentsFailed`.
    pub async fn generate_all(&self, ctx: &GenerationContext) -> Result<GenerationBatch, RaceError> {
        let started = Instant::now();
        tracing::info!(
            agents = self.agents.len(),
            iteration = ctx.iteration,
            "Generating hypotheses"
        );

        let results = join_all(self.agents.iter().map(|a| self.run_generate(a, ctx))).await;

        let hypotheses_by_agent: BTreeMap<String, Vec<Hypothesis>> = results
            .iter()
            .map(|r| (r.agent_id.clone(), r.hypotheses.clone()))
            .collect();
        let batch = GenerationBatch {
            total_time_ms: started.elapsed().as_millis() as u64,
            hypotheses_by_agent,
            low_yield: false,
            results,
        };

        let total = batch.total();
        if total == 0 {
            if self.abort.is_aborted() {
                return Err(RaceError::Aborted);
            }
            return Err(RaceError::AllAgentsFailed {
                agents: self.agents.len(),
            });
        }

        let low_yield = total < self.config.min_total_hypotheses;
        if low_yield {
            tracing::warn!(
                total,
                minimum = self.config.min_total_hypotheses,
                failed = ?batch.failed_agents(),
                "Low hypothesis yield"
            );
        }
        Ok(GenerationBatch { low_yield, ..batch })
    }

    async fn run_generate(
        &self,
        agent: &Arc<dyn GeneratorAgent>,
        ctx: &GenerationContext,
    ) -> AgentRunResult {
        let agent_id = agent.id().to_string();
        let started = Instant::now();
        self.update_status(&agent_id, |s| {
            s.state = AgentLifecycle::Generating;
            s.started_at = Some(chrono::Utc::now());
        });

        let outcome = match self.permits.acquire().await {
            Ok(_permit) => {
                let signal = self.abort.signal();
                retry_with_timeout(
                    &self.config.retry,
                    &signal,
                    &format!("{agent_id} generate"),
                    move |_attempt| agent.generate(ctx),
                )
                .await
            }
            Err(_) => Err(RaceError::Aborted),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(hypotheses) => {
                let count = hypotheses.len();
                self.update_status(&agent_id, |s| {
                    s.state = AgentLifecycle::Completed;
                    s.hypotheses_generated += count;
                    s.finished_at = Some(chrono::Utc::now());
                });
                tracing::debug!(agent = %agent_id, count, duration_ms, "Agent generated");
                AgentRunResult {
                    agent_id,
                    hypotheses,
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(agent = %agent_id, error = %message, "Agent generation failed");
                self.update_status(&agent_id, |s| {
                    s.state = AgentLifecycle::Failed;
                    s.errors.push(message.clone());
                    s.finished_at = Some(chrono::Utc::now());
                });
                AgentRunResult {
                    agent_id,
                    hypotheses: Vec::new(),
                    error: Some(message),
                    duration_ms,
                }
            }
        }
    }

    /// Ask each owning agent to refine its hypotheses: agents in parallel,
    /// one hypothesis at a time within an agent. A hypothesis with no
    /// feedback, no owning agent, or a failed refinement is returned as is.
    /// Output order matches input order.
    pub async fn refine_hypotheses(
        &self,
        hypotheses: &[Hypothesis],
        feedback: &HashMap<String, RefinementFeedback>,
        ctx: &GenerationContext,
    ) -> Vec<Hypothesis> {
        let mut by_agent: BTreeMap<&str, Vec<(usize, &Hypothesis)>> = BTreeMap::new();
        for (i, h) in hypotheses.iter().enumerate() {
            by_agent.entry(h.agent_id.as_str()).or_default().push((i, h));
        }

        let groups = by_agent.into_iter().map(|(agent_id, items)| {
            let agent = self.agents.iter().find(|a| a.id() == agent_id);
            self.refine_group(agent, items, feedback, ctx)
        });
        let refined_groups = join_all(groups).await;

        let mut out: Vec<Hypothesis> = hypotheses.to_vec();
        for (i, h) in refined_groups.into_iter().flatten() {
            out[i] = h;
        }
        out
    }

    async fn refine_group(
        &self,
        agent: Option<&Arc<dyn GeneratorAgent>>,
        items: Vec<(usize, &Hypothesis)>,
        feedback: &HashMap<String, RefinementFeedback>,
        ctx: &GenerationContext,
    ) -> Vec<(usize, Hypothesis)> {
        let Some(agent) = agent else {
            if let Some((_, h)) = items.first() {
                tracing::warn!(agent = %h.agent_id, "No agent owns these hypotheses; keeping originals");
            }
            return Vec::new();
        };

        let agent_id = agent.id().to_string();
        self.update_status(&agent_id, |s| s.state = AgentLifecycle::Refining);

        let mut refined = Vec::new();
        for (index, hypothesis) in items {
            let Some(fb) = feedback.get(&hypothesis.id) else {
                continue;
            };

            let outcome = match self.permits.acquire().await {
                Ok(_permit) => {
                    let signal = self.abort.signal();
                    retry_with_timeout(
                        &self.config.retry,
                        &signal,
                        &format!("{agent_id} refine"),
                        move |_attempt| agent.refine(hypothesis, fb, ctx),
                    )
                    .await
                }
                Err(_) => Err(RaceError::Aborted),
            };

            match outcome {
                Ok(next) => refined.push((index, next)),
                Err(e) => {
                    tracing::warn!(
                        agent = %agent_id,
                        hypothesis_id = %hypothesis.id,
                        error = %e,
                        "Refinement failed; keeping original"
                    );
                    self.update_status(&agent_id, |s| s.errors.push(e.to_string()));
                }
            }
        }

        self.update_status(&agent_id, |s| s.state = AgentLifecycle::Completed);
        refined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AgentSource;
    use crate::evaluator::{generate_feedback, BreakthroughEvaluator, EvaluatorConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    enum Behaviour {
        Produce(usize),
        FailTwiceThenProduce,
        AlwaysFail,
    }

    struct StubAgent {
        id: String,
        behaviour: Behaviour,
        calls: AtomicU32,
    }

    impl StubAgent {
        fn new(id: &str, behaviour: Behaviour) -> Arc<dyn GeneratorAgent> {
            Arc::new(Self {
                id: id.into(),
                behaviour,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl GeneratorAgent for StubAgent {
        fn id(&self) -> &str {
            &self.id
        }

        fn source(&self) -> AgentSource {
            AgentSource::Incremental
        }

        async fn generate(&self, _ctx: &GenerationContext) -> Result<Vec<Hypothesis>, RaceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let count = match self.behaviour {
                Behaviour::Produce(n) => n,
                Behaviour::FailTwiceThenProduce if call >= 2 => 1,
                _ => {
                    return Err(RaceError::Agent {
                        agent: self.id.clone(),
                        message: "flaky".into(),
                        retriable: true,
                    })
                }
            };
            Ok((0..count)
                .map(|i| Hypothesis::new(&self.id, AgentSource::Incremental, format!("{} #{i}", self.id), "s"))
                .collect())
        }

        async fn refine(
            &self,
            hypothesis: &Hypothesis,
            _feedback: &RefinementFeedback,
            ctx: &GenerationContext,
        ) -> Result<Hypothesis, RaceError> {
            if matches!(self.behaviour, Behaviour::AlwaysFail) {
                return Err(RaceError::Agent {
                    agent: self.id.clone(),
                    message: "cannot refine".into(),
                    retriable: false,
                });
            }
            let mut next = hypothesis.clone();
            next.title = format!("{} (refined)", hypothesis.title);
            Ok(next.as_refinement_of(hypothesis, ctx.iteration))
        }
    }

    fn fast_config() -> PoolConfig {
        PoolConfig {
            max_concurrency: 2,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                backoff_factor: 2.0,
                timeout: Duration::from_secs(5),
            },
            min_total_hypotheses: 3,
        }
    }

    fn ctx() -> GenerationContext {
        GenerationContext {
            race_id: "r".into(),
            research: Default::default(),
            problem: "p".into(),
            iteration: 1,
            hypotheses_per_agent: 2,
        }
    }

    // ─── generate_all ───────────────────────────────────────────

    #[tokio::test]
    async fn test_partial_failure_is_absorbed() {
        let pool = AgentPool::new(
            vec![
                StubAgent::new("a", Behaviour::Produce(2)),
                StubAgent::new("b", Behaviour::AlwaysFail),
                StubAgent::new("c", Behaviour::Produce(2)),
            ],
            fast_config(),
        );
        let batch = pool.generate_all(&ctx()).await.unwrap();
        assert_eq!(batch.total(), 4);
        assert!(!batch.low_yield);
        assert_eq!(batch.failed_agents(), vec!["b"]);
        assert!(batch.hypotheses_by_agent["b"].is_empty());

        let statuses = pool.statuses();
        assert_eq!(statuses[1].state, AgentLifecycle::Failed);
        assert!(statuses[1].errors[0].contains("3 attempts"));
        assert_eq!(statuses[0].hypotheses_generated, 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let pool = AgentPool::new(
            vec![StubAgent::new("a", Behaviour::FailTwiceThenProduce)],
            fast_config(),
        );
        let batch = pool.generate_all(&ctx()).await.unwrap();
        assert_eq!(batch.total(), 1);
        assert!(batch.low_yield);
    }

    #[tokio::test]
    async fn test_all_failed_is_fatal() {
        let pool = AgentPool::new(
            vec![
                StubAgent::new("a", Behaviour::AlwaysFail),
                StubAgent::new("b", Behaviour::AlwaysFail),
            ],
            fast_config(),
        );
        let err = pool.generate_all(&ctx()).await.unwrap_err();
        assert!(matches!(err, RaceError::AllAgentsFailed { agents: 2 }));
    }

    #[tokio::test]
    async fn test_aborted_pool_reports_abort() {
        let pool = AgentPool::new(vec![StubAgent::new("a", Behaviour::Produce(1))], fast_config());
        pool.abort();
        let err = pool.generate_all(&ctx()).await.unwrap_err();
        assert!(err.is_aborted());
    }

    // ─── refine_hypotheses ──────────────────────────────────────

    #[tokio::test]
    async fn test_refine_is_fail_open_and_order_preserving() {
        let pool = AgentPool::new(
            vec![
                StubAgent::new("good", Behaviour::Produce(1)),
                StubAgent::new("bad", Behaviour::AlwaysFail),
            ],
            fast_config(),
        );
        let hyps = vec![
            Hypothesis::new("good", AgentSource::Incremental, "g1", "s"),
            Hypothesis::new("bad", AgentSource::Incremental, "b1", "s"),
            Hypothesis::new("good", AgentSource::Incremental, "g2", "s"),
            Hypothesis::new("orphan", AgentSource::Incremental, "o1", "s"),
        ];
        let evaluator = BreakthroughEvaluator::new(EvaluatorConfig::default());
        let feedback: HashMap<String, RefinementFeedback> = hyps
            .iter()
            .filter(|h| h.title != "g2")
            .map(|h| (h.id.clone(), generate_feedback(&evaluator.quick_evaluate(h), None)))
            .collect();

        let mut c = ctx();
        c.iteration = 2;
        let out = pool.refine_hypotheses(&hyps, &feedback, &c).await;

        let titles: Vec<_> = out.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["g1 (refined)", "b1", "g2", "o1"]);
        assert_eq!(out[0].version, 2);
        assert_eq!(out[0].id, hyps[0].id);
        assert_eq!(out[1].version, 1);
    }
}
