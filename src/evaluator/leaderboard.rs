// src/evaluator/leaderboard.rs — Ranked view of non-eliminated hypotheses

use std::collections::HashMap;

use crate::core::types::{Hypothesis, HypothesisStatus, LeaderboardEntry};

/// Rank by overall score descending; ties go to the earlier-generated
/// hypothesis. Eliminated hypotheses are left out.
pub fn build_leaderboard<'a>(
    hypotheses: impl IntoIterator<Item = &'a Hypothesis>,
    deltas: &HashMap<String, f64>,
) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&Hypothesis> = hypotheses
        .into_iter()
        .filter(|h| h.status != HypothesisStatus::Eliminated)
        .collect();
    ranked.sort_by(|a, b| {
        b.overall_score()
            .total_cmp(&a.overall_score())
            .then(a.seq.cmp(&b.seq))
    });

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, h)| LeaderboardEntry {
            rank: i + 1,
            hypothesis_id: h.id.clone(),
            title: h.title.clone(),
            agent_source: h.agent_source,
            overall_score: h.overall_score(),
            score_delta: deltas.get(&h.id).copied(),
            classification: h.classification(),
            status: h.status,
        })
        .collect()
}
