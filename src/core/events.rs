// src/core/events.rs — Progress events emitted by the racing arena

use serde::{Deserialize, Serialize};

use super::types::TerminationReason;

/// Typed progress notifications for callers observing a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaceEvent {
    RaceStarted {
        race_id: String,
        max_iterations: u32,
        agents: usize,
    },
    IterationStarted {
        iteration: u32,
        max_iterations: u32,
    },
    GenerationStarted {
        iteration: u32,
        agents: usize,
    },
    HypothesisGenerated {
        hypothesis_id: String,
        agent_id: String,
        title: String,
    },
    GenerationComplete {
        iteration: u32,
        generated: usize,
        failed_agents: Vec<String>,
        low_yield: bool,
    },
    EvaluationStarted {
        iteration: u32,
        count: usize,
    },
    EvaluationComplete {
        iteration: u32,
        evaluated: usize,
        best_score: f64,
        average_score: f64,
    },
    HypothesisEliminated {
        hypothesis_id: String,
        score: f64,
        reason: String,
    },
    BreakthroughFound {
        hypothesis_id: String,
        title: String,
        score: f64,
    },
    ValidationStarted {
        iteration: u32,
        eligible: usize,
    },
    ValidationComplete {
        iteration: u32,
        validated: usize,
        skipped: bool,
        cost_usd: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    RefinementStarted {
        iteration: u32,
        count: usize,
    },
    HypothesisUpdated {
        hypothesis_id: String,
        version: u32,
    },
    RefinementRejected {
        hypothesis_id: String,
        predecessor_score: f64,
        refined_score: f64,
    },
    RefinementComplete {
        iteration: u32,
        accepted: usize,
        rejected: usize,
    },
    IterationComplete {
        iteration: u32,
        active: usize,
        eliminated: usize,
        breakthroughs: usize,
        best_score: f64,
    },
    ExpertReviewRequested {
        count: usize,
    },
    ExpertReviewComplete {
        approved: usize,
        rejected: usize,
        refined: usize,
    },
    RaceComplete {
        race_id: String,
        winners: usize,
        iterations: u32,
        termination: TerminationReason,
        duration_ms: u64,
    },
    RaceError {
        message: String,
    },
}

impl std::fmt::Display for RaceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaceEvent::RaceStarted {
                max_iterations,
                agents,
                ..
            } => write!(f, "Race started with {agents} agents, up to {max_iterations} iterations"),
            RaceEvent::IterationStarted {
                iteration,
                max_iterations,
            } => write!(f, "Iteration {iteration}/{max_iterations}"),
            RaceEvent::GenerationStarted { agents, .. } => {
                write!(f, "Generating hypotheses with {agents} agents")
            }
            RaceEvent::HypothesisGenerated {
                agent_id, title, ..
            } => write!(f, "{agent_id} proposed \"{title}\""),
            RaceEvent::GenerationComplete {
                generated,
                failed_agents,
                low_yield,
                ..
            } => {
                write!(f, "Generated {generated} hypotheses")?;
                if !failed_agents.is_empty() {
                    write!(f, " ({} failed: {})", failed_agents.len(), failed_agents.join(", "))?;
                }
                if *low_yield {
                    write!(f, " [low yield]")?;
                }
                Ok(())
            }
            RaceEvent::EvaluationStarted { count, .. } => {
                write!(f, "Evaluating {count} hypotheses")
            }
            RaceEvent::EvaluationComplete {
                evaluated,
                best_score,
                average_score,
                ..
            } => write!(
                f,
                "Evaluated {evaluated}: best {best_score:.2}, average {average_score:.2}"
            ),
            RaceEvent::HypothesisEliminated {
                hypothesis_id,
                reason,
                ..
            } => write!(f, "Eliminated {}: {reason}", short_id(hypothesis_id)),
            RaceEvent::BreakthroughFound { title, score, .. } => {
                write!(f, "Breakthrough candidate \"{title}\" at {score:.2}")
            }
            RaceEvent::ValidationStarted { eligible, .. } => {
                write!(f, "GPU validation for {eligible} hypotheses")
            }
            RaceEvent::ValidationComplete {
                validated,
                skipped,
                cost_usd,
                note,
                ..
            } => {
                if *skipped {
                    write!(f, "GPU validation skipped")?;
                } else {
                    write!(f, "GPU validated {validated} (${cost_usd:.2})")?;
                }
                match note {
                    Some(n) => write!(f, ": {n}"),
                    None => Ok(()),
                }
            }
            RaceEvent::RefinementStarted { count, .. } => {
                write!(f, "Refining {count} hypotheses")
            }
            RaceEvent::HypothesisUpdated {
                hypothesis_id,
                version,
            } => write!(f, "{} refined to v{version}", short_id(hypothesis_id)),
            RaceEvent::RefinementRejected {
                hypothesis_id,
                predecessor_score,
                refined_score,
            } => write!(
                f,
                "Rejected refinement of {} ({refined_score:.2} < {predecessor_score:.2})",
                short_id(hypothesis_id)
            ),
            RaceEvent::RefinementComplete {
                accepted, rejected, ..
            } => write!(f, "Refinements: {accepted} accepted, {rejected} rejected"),
            RaceEvent::IterationComplete {
                iteration,
                active,
                eliminated,
                breakthroughs,
                best_score,
            } => write!(
                f,
                "Iteration {iteration} done: {active} active, {eliminated} eliminated, \
                 {breakthroughs} breakthrough, best {best_score:.2}"
            ),
            RaceEvent::ExpertReviewRequested { count } => {
                write!(f, "Expert review requested for {count} hypotheses")
            }
            RaceEvent::ExpertReviewComplete {
                approved,
                rejected,
                refined,
            } => write!(
                f,
                "Expert review: {approved} approved, {rejected} rejected, {refined} to refine"
            ),
            RaceEvent::RaceComplete {
                winners,
                iterations,
                termination,
                duration_ms,
                ..
            } => write!(
                f,
                "Race complete after {iterations} iterations ({termination}): {winners} winners in {:.1}s",
                *duration_ms as f64 / 1000.0
            ),
            RaceEvent::RaceError { message } => write!(f, "Race failed: {message}"),
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
