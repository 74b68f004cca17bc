// src/score/classification.rs — Five-tier outcome classification

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dimensions::{required_dimensions, DimensionId, DimensionScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Failure,
    PartialFailure,
    GeneralInsights,
    ScientificDiscovery,
    Breakthrough,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", tier_def(*self).label)
    }
}

/// Score range `[min, max)` for a tier; the top tier includes 10.0.
#[derive(Debug)]
pub struct TierDef {
    pub classification: Classification,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
}

pub static TIERS: [TierDef; 5] = [
    TierDef {
        classification: Classification::Breakthrough,
        label: "breakthrough",
        min: 9.0,
        max: 10.0,
    },
    TierDef {
        classification: Classification::ScientificDiscovery,
        label: "scientific discovery",
        min: 8.0,
        max: 9.0,
    },
    TierDef {
        classification: Classification::GeneralInsights,
        label: "general insights",
        min: 6.5,
        max: 8.0,
    },
    TierDef {
        classification: Classification::PartialFailure,
        label: "partial failure",
        min: 5.0,
        max: 6.5,
    },
    TierDef {
        classification: Classification::Failure,
        label: "failure",
        min: 0.0,
        max: 5.0,
    },
];

pub fn tier_def(classification: Classification) -> &'static TierDef {
    TIERS
        .iter()
        .find(|t| t.classification == classification)
        .unwrap_or(&TIERS[TIERS.len() - 1])
}

/// Tier for a raw score, ignoring the required-dimension gate.
pub fn tier_for_score(overall: f64) -> Classification {
    TIERS
        .iter()
        .find(|t| overall >= t.min)
        .map(|t| t.classification)
        .unwrap_or(Classification::Failure)
}

/// True when every required dimension is present and passes.
pub fn required_dimensions_met(dimensions: &BTreeMap<DimensionId, DimensionScore>) -> bool {
    required_dimensions().all(|def| {
        dimensions
            .get(&def.id)
            .map(|s| def.passes(s.percentage))
            .unwrap_or(false)
    })
}

/// Classify an overall score. A breakthrough-range score that fails a
/// required dimension is demoted to scientific discovery.
pub fn classify(
    overall: f64,
    dimensions: &BTreeMap<DimensionId, DimensionScore>,
) -> Classification {
    match tier_for_score(overall) {
        Classification::Breakthrough if !required_dimensions_met(dimensions) => {
            Classification::ScientificDiscovery
        }
        tier => tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(required_pct: (f64, f64), other_pct: f64) -> BTreeMap<DimensionId, DimensionScore> {
        DimensionId::ALL
            .iter()
            .map(|&id| {
                let pct = match id {
                    DimensionId::PerformanceGains => required_pct.0,
                    DimensionId::CostReduction => required_pct.1,
                    _ => other_pct,
                };
                (id, DimensionScore::new(id, pct, vec![], vec![]))
            })
            .collect()
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(tier_for_score(10.0), Classification::Breakthrough);
        assert_eq!(tier_for_score(9.0), Classification::Breakthrough);
        assert_eq!(tier_for_score(8.99), Classification::ScientificDiscovery);
        assert_eq!(tier_for_score(8.0), Classification::ScientificDiscovery);
        assert_eq!(tier_for_score(7.99), Classification::GeneralInsights);
        assert_eq!(tier_for_score(6.5), Classification::GeneralInsights);
        assert_eq!(tier_for_score(6.49), Classification::PartialFailure);
        assert_eq!(tier_for_score(5.0), Classification::PartialFailure);
        assert_eq!(tier_for_score(4.99), Classification::Failure);
        assert_eq!(tier_for_score(0.0), Classification::Failure);
    }

    #[test]
    fn test_high_score_with_weak_required_dimension_is_not_breakthrough() {
        let d = dims((50.0, 95.0), 100.0);
        assert!(!required_dimensions_met(&d));
        assert_eq!(classify(9.5, &d), Classification::ScientificDiscovery);
    }

    #[test]
    fn test_breakthrough_with_both_required_passing() {
        let d = dims((85.0, 85.0), 95.0);
        assert!(required_dimensions_met(&d));
        assert_eq!(classify(9.2, &d), Classification::Breakthrough);
    }

    #[test]
    fn test_missing_required_dimension_fails_gate() {
        let mut d = dims((90.0, 90.0), 90.0);
        d.remove(&DimensionId::CostReduction);
        assert!(!required_dimensions_met(&d));
    }

    #[test]
    fn test_gate_does_not_affect_lower_tiers() {
        let d = dims((10.0, 10.0), 90.0);
        assert_eq!(classify(7.0, &d), Classification::GeneralInsights);
    }

    #[test]
    fn test_display_uses_labels() {
        assert_eq!(
            Classification::ScientificDiscovery.to_string(),
            "scientific discovery"
        );
    }
}
