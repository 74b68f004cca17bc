// src/score/elimination.rs — Grace-period elimination and breakthrough gates

use serde::{Deserialize, Serialize};

use super::classification::Classification;

/// Never eliminate below this many active hypotheses.
pub const MIN_ACTIVE_SURVIVORS: usize = 3;

/// Overall score at or above which a hypothesis is a breakthrough candidate.
pub const BREAKTHROUGH_THRESHOLD: f64 = 9.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EliminationPolicy {
    pub min_active: usize,
    /// `(from_iteration, floor)` pairs, ascending by iteration.
    pub floors: Vec<(u32, f64)>,
}

impl Default for EliminationPolicy {
    fn default() -> Self {
        Self {
            min_active: MIN_ACTIVE_SURVIVORS,
            floors: vec![(2, 4.0), (3, 5.0), (4, 5.5)],
        }
    }
}

/// A hypothesis considered for elimination in one batch.
#[derive(Debug, Clone)]
pub struct EliminationCandidate {
    pub id: String,
    pub score: f64,
    /// Generation order; lower means generated earlier.
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elimination {
    pub id: String,
    pub score: f64,
    pub floor: f64,
    pub reason: String,
}

impl EliminationPolicy {
    /// Score floor in effect for an iteration. Iteration 1 is a grace period.
    pub fn floor_for(&self, iteration: u32) -> Option<f64> {
        if iteration <= 1 {
            return None;
        }
        self.floors
            .iter()
            .filter(|(from, _)| *from <= iteration)
            .last()
            .map(|(_, floor)| *floor)
    }

    pub fn should_eliminate(&self, score: f64, iteration: u32, active_count: usize) -> bool {
        if active_count <= self.min_active {
            return false;
        }
        match self.floor_for(iteration) {
            Some(floor) => score < floor,
            None => false,
        }
    }

    /// Choose which candidates to eliminate this iteration.
    ///
    /// Lowest scores go first; among equal scores the later-generated
    /// hypothesis goes first. Stops as soon as only `min_active` would remain.
    pub fn select_eliminations(
        &self,
        candidates: &[EliminationCandidate],
        iteration: u32,
        active_count: usize,
    ) -> Vec<Elimination> {
        let Some(floor) = self.floor_for(iteration) else {
            return Vec::new();
        };
        if active_count <= self.min_active {
            return Vec::new();
        }

        let mut below: Vec<&EliminationCandidate> =
            candidates.iter().filter(|c| c.score < floor).collect();
        below.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.seq.cmp(&a.seq))
        });

        let allowance = active_count - self.min_active;
        below
            .into_iter()
            .take(allowance)
            .map(|c| Elimination {
                id: c.id.clone(),
                score: c.score,
                floor,
                reason: format!(
                    "Score {:.2} below iteration {} floor of {:.1}",
                    c.score, iteration, floor
                ),
            })
            .collect()
    }
}

/// Breakthrough candidates must clear the threshold *and* hold a
/// breakthrough classification (which already gates on required dimensions).
pub fn is_breakthrough_candidate(
    overall: f64,
    classification: Classification,
    threshold: f64,
) -> bool {
    overall >= threshold && classification == Classification::Breakthrough
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, score: f64, seq: u64) -> EliminationCandidate {
        EliminationCandidate {
            id: id.into(),
            score,
            seq,
        }
    }

    #[test]
    fn test_floors_rise_with_iteration() {
        let p = EliminationPolicy::default();
        assert_eq!(p.floor_for(1), None);
        assert_eq!(p.floor_for(2), Some(4.0));
        assert_eq!(p.floor_for(3), Some(5.0));
        assert_eq!(p.floor_for(4), Some(5.5));
        assert_eq!(p.floor_for(9), Some(5.5));
    }

    #[test]
    fn test_never_eliminate_in_first_iteration() {
        let p = EliminationPolicy::default();
        for score in [0.0, 1.0, 3.9, 9.9] {
            assert!(!p.should_eliminate(score, 1, 50));
        }
    }

    #[test]
    fn test_diversity_floor_blocks_elimination() {
        let p = EliminationPolicy::default();
        for active in 0..=3 {
            assert!(!p.should_eliminate(0.5, 4, active));
        }
        assert!(p.should_eliminate(0.5, 4, 4));
    }

    #[test]
    fn test_select_respects_min_survivors() {
        let p = EliminationPolicy::default();
        let cands = vec![
            cand("a", 1.0, 0),
            cand("b", 2.0, 1),
            cand("c", 3.0, 2),
            cand("d", 8.0, 3),
        ];
        let out = p.select_eliminations(&cands, 2, 4);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[0].floor, 4.0);
    }

    #[test]
    fn test_select_eliminates_all_below_floor_when_room() {
        let p = EliminationPolicy::default();
        let cands = vec![
            cand("a", 4.9, 0),
            cand("b", 6.0, 1),
            cand("c", 7.0, 2),
            cand("d", 8.0, 3),
            cand("e", 3.0, 4),
        ];
        let ids: Vec<_> = p
            .select_eliminations(&cands, 3, 5)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_ties_eliminate_later_generated_first() {
        let p = EliminationPolicy::default();
        let cands = vec![
            cand("early", 2.0, 0),
            cand("late", 2.0, 7),
            cand("x", 9.0, 1),
            cand("y", 9.0, 2),
        ];
        let out = p.select_eliminations(&cands, 2, 4);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "late");
    }

    #[test]
    fn test_breakthrough_candidate_gate() {
        assert!(is_breakthrough_candidate(
            9.2,
            Classification::Breakthrough,
            BREAKTHROUGH_THRESHOLD
        ));
        assert!(!is_breakthrough_candidate(
            9.5,
            Classification::ScientificDiscovery,
            BREAKTHROUGH_THRESHOLD
        ));
        assert!(!is_breakthrough_candidate(
            8.9,
            Classification::Breakthrough,
            BREAKTHROUGH_THRESHOLD
        ));
    }
}
