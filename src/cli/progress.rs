// src/cli/progress.rs — Terminal progress renderer for race events

use crate::core::events::RaceEvent;
use crate::core::types::RaceResult;

/// One stderr line per event, or `None` for per-hypothesis chatter.
pub fn format_event(event: &RaceEvent) -> Option<String> {
    let tag = match event {
        RaceEvent::RaceStarted { .. } => "race",
        RaceEvent::IterationStarted {
            iteration,
            max_iterations,
        } => return Some(format!("[iter {iteration}/{max_iterations}] starting")),
        RaceEvent::HypothesisGenerated { .. } | RaceEvent::HypothesisUpdated { .. } => {
            return None
        }
        RaceEvent::GenerationStarted { .. } | RaceEvent::GenerationComplete { .. } => "gen",
        RaceEvent::EvaluationStarted { .. } | RaceEvent::EvaluationComplete { .. } => "eval",
        RaceEvent::HypothesisEliminated { .. } => "elim",
        RaceEvent::BreakthroughFound { .. } => "BREAKTHROUGH",
        RaceEvent::ValidationStarted { .. } | RaceEvent::ValidationComplete { .. } => "gpu",
        RaceEvent::RefinementStarted { .. }
        | RaceEvent::RefinementRejected { .. }
        | RaceEvent::RefinementComplete { .. } => "refine",
        RaceEvent::IterationComplete { iteration, .. } => {
            return Some(format!("[iter {iteration}] {event}"))
        }
        RaceEvent::ExpertReviewRequested { .. } | RaceEvent::ExpertReviewComplete { .. } => {
            "review"
        }
        RaceEvent::RaceComplete { .. } => "done",
        RaceEvent::RaceError { .. } => "error",
    };
    Some(format!("[{tag}] {event}"))
}

/// Build a progress callback that writes formatted output to stderr.
///
/// Stdout stays clean for the final result. Returns a closure suitable for
/// `RacingArena::on_event()`.
pub fn terminal_progress() -> impl Fn(RaceEvent) + Send + Sync + 'static {
    move |event| {
        if let Some(line) = format_event(&event) {
            eprintln!("{line}");
        }
    }
}

/// Human-readable summary of a finished race.
pub fn format_result(result: &RaceResult) -> String {
    let mut out = format!(
        "Race {} finished after {} iteration(s): {}\n",
        result.race_id, result.iterations_completed, result.termination
    );

    if result.winners.is_empty() {
        out.push_str("\nNo winners.\n");
    } else {
        out.push_str("\nWinners:\n");
        for (i, h) in result.winners.iter().enumerate() {
            let class = h
                .classification()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unscored".into());
            out.push_str(&format!(
                "  {}. {} [{:.2}, {}] ({})\n",
                i + 1,
                h.title,
                h.overall_score(),
                class,
                h.agent_source
            ));
            out.push_str(&format!("     {}\n", h.statement));
        }
    }

    let s = &result.statistics;
    out.push_str(&format!(
        "\nGenerated {}, eliminated {}, breakthroughs {}, refinements {}/{} accepted\n",
        s.total_generated,
        s.total_eliminated,
        s.total_breakthroughs,
        s.refinements_accepted,
        s.refinements_accepted + s.refinements_rejected
    ));
    if s.gpu_validations > 0 {
        out.push_str(&format!(
            "GPU validations {} (${:.2})\n",
            s.gpu_validations, s.gpu_cost_usd
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{RaceStatistics, TerminationReason};
    use std::sync::{Arc, Mutex};

    /// Helper that captures progress output into a Vec instead of stderr.
    fn capturing_progress() -> (impl Fn(RaceEvent) + Send + 'static, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let cb = move |event: RaceEvent| {
            if let Some(line) = format_event(&event) {
                log_clone.lock().unwrap().push(line);
            }
        };
        (cb, log)
    }

    #[test]
    fn test_iteration_lines() {
        let (cb, log) = capturing_progress();
        cb(RaceEvent::IterationStarted {
            iteration: 2,
            max_iterations: 5,
        });
        cb(RaceEvent::IterationComplete {
            iteration: 2,
            active: 4,
            eliminated: 1,
            breakthroughs: 0,
            best_score: 7.5,
        });
        let msgs = log.lock().unwrap();
        assert_eq!(msgs[0], "[iter 2/5] starting");
        assert_eq!(
            msgs[1],
            "[iter 2] Iteration 2 done: 4 active, 1 eliminated, 0 breakthrough, best 7.50"
        );
    }

    #[test]
    fn test_per_hypothesis_events_hidden() {
        let (cb, log) = capturing_progress();
        cb(RaceEvent::HypothesisGenerated {
            hypothesis_id: "h".into(),
            agent_id: "a".into(),
            title: "t".into(),
        });
        cb(RaceEvent::HypothesisUpdated {
            hypothesis_id: "h".into(),
            version: 2,
        });
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tagged_lines() {
        let line = format_event(&RaceEvent::RefinementComplete {
            iteration: 3,
            accepted: 2,
            rejected: 1,
        })
        .unwrap();
        assert_eq!(line, "[refine] Refinements: 2 accepted, 1 rejected");

        let line = format_event(&RaceEvent::RaceError {
            message: "all 5 agents failed".into(),
        })
        .unwrap();
        assert_eq!(line, "[error] Race failed: all 5 agents failed");
    }

    #[test]
    fn test_format_result_without_winners() {
        let now = chrono::Utc::now();
        let result = RaceResult {
            race_id: "r1".into(),
            winners: Vec::new(),
            leaderboard: Vec::new(),
            iterations_completed: 1,
            termination: TerminationReason::NoActiveHypotheses,
            statistics: RaceStatistics::default(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        };
        let text = format_result(&result);
        assert!(text.starts_with("Race r1 finished after 1 iteration(s): no active hypotheses remain"));
        assert!(text.contains("No winners."));
        assert!(!text.contains("GPU validations"));
    }
}
