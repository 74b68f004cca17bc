// src/evaluator/cache.rs — Structured-field score cache and its policy
//
// Dimensions derived from a hypothesis' structured fields (predicted outcomes,
// parameters, evidence) can either be recomputed on every evaluation or
// pinned to the first version's scores. Pinning hides regressions introduced
// by refinement, so it is opt-in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use crate::score::{DimensionId, DimensionScore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredFieldPolicy {
    /// Score structured fields afresh on every evaluation.
    #[default]
    Recompute,
    /// Reuse the scores from the first evaluation of a hypothesis id.
    Preserve,
}

/// Dimensions whose deterministic score depends on structured fields.
pub const STRUCTURED_DIMENSIONS: [DimensionId; 3] = [
    DimensionId::PerformanceGains,
    DimensionId::CostReduction,
    DimensionId::EvidenceQuality,
];

struct CachedFields {
    version: u32,
    scores: BTreeMap<DimensionId, DimensionScore>,
}

pub struct StructuredFieldCache {
    policy: StructuredFieldPolicy,
    entries: Mutex<HashMap<String, CachedFields>>,
}

impl StructuredFieldCache {
    pub fn new(policy: StructuredFieldPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> StructuredFieldPolicy {
        self.policy
    }

    /// Apply the policy to freshly computed scores. Returns true when cached
    /// scores replaced fresh ones.
    pub fn apply(
        &self,
        hypothesis_id: &str,
        version: u32,
        scores: &mut BTreeMap<DimensionId, DimensionScore>,
    ) -> bool {
        if self.policy == StructuredFieldPolicy::Recompute {
            return false;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(hypothesis_id) {
            Some(cached) if cached.version < version => {
                for (dim, score) in &cached.scores {
                    scores.insert(*dim, score.clone());
                }
                tracing::debug!(
                    hypothesis_id,
                    cached_version = cached.version,
                    version,
                    "Preserved structured-field scores from earlier version"
                );
                true
            }
            Some(_) => false,
            None => {
                let pinned = STRUCTURED_DIMENSIONS
                    .iter()
                    .filter_map(|d| scores.get(d).map(|s| (*d, s.clone())))
                    .collect();
                entries.insert(
                    hypothesis_id.to_string(),
                    CachedFields {
                        version,
                        scores: pinned,
                    },
                );
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
