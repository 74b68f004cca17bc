// src/evaluator/scorers.rs — Deterministic per-dimension scorers
//
// Structural and keyword signals only; no external calls. Every dimension
// always yields a score: with no signal it falls to NO_SIGNAL_PERCENT.

use std::collections::{BTreeMap, HashSet};

use crate::core::types::Hypothesis;
use crate::score::dimensions::NO_SIGNAL_PERCENT;
use crate::score::{DimensionId, DimensionScore};

const PERFORMANCE_TERMS: &[&str] = &[
    "efficiency", "performance", "output", "yield", "throughput", "power density",
    "capacity factor", "conversion",
];
const COST_TERMS: &[&str] = &[
    "cost", "lcoe", "price", "capex", "opex", "$/", "cheaper", "affordable", "payback",
];
const CAPABILITY_TERMS: &[&str] = &[
    "enable", "first", "novel", "unprecedented", "new class", "previously impossible",
    "breakthrough", "outperform",
];
const APPLICATION_TERMS: &[&str] = &[
    "application", "use case", "sector", "deploy", "market", "integrat", "retrofit",
    "off-grid",
];
const SOCIETAL_TERMS: &[&str] = &[
    "emission", "carbon", "climate", "health", "access", "equity", "jobs", "community",
    "pollution",
];
const SCALE_TERMS: &[&str] = &[
    "gw", "tw", "global", "billion", "million", "worldwide", "gigawatt", "utility-scale",
    "mass production",
];
const TRAJECTORY_TERMS: &[&str] = &[
    "research", "study", "literature", "trend", "prior work", "roadmap", "builds on",
    "published", "record",
];

const PERFORMANCE_PARAMS: &[&str] = &["efficiency_mean", "capacity_factor", "capacity_kw"];
const COST_PARAMS: &[&str] = &["cost_mean", "target_lcoe"];

/// Accumulated signal for one dimension.
struct Signal {
    hits: usize,
    saturation: usize,
    evidence: Vec<String>,
}

impl Signal {
    fn new(saturation: usize) -> Self {
        Self {
            hits: 0,
            saturation: saturation.max(1),
            evidence: Vec::new(),
        }
    }

    fn add(&mut self, weight: usize, evidence: impl Into<String>) {
        if weight > 0 {
            self.hits += weight;
            self.evidence.push(evidence.into());
        }
    }

    /// 30% for the first hit, rising linearly to 100% at saturation.
    fn percent(&self) -> f64 {
        if self.hits == 0 {
            return NO_SIGNAL_PERCENT;
        }
        let h = self.hits.min(self.saturation) as f64;
        30.0 + 70.0 * h / self.saturation as f64
    }

    fn into_score(self, dimension: DimensionId, gap: &str) -> DimensionScore {
        if self.hits == 0 {
            return DimensionScore::no_signal(dimension, gap);
        }
        let percent = self.percent();
        let gaps = if percent < 70.0 {
            vec![gap.to_string()]
        } else {
            Vec::new()
        };
        DimensionScore::new(dimension, percent, self.evidence, gaps)
    }
}

fn matched_terms<'a>(text: &str, terms: &'a [&'a str]) -> Vec<&'a str> {
    terms.iter().copied().filter(|t| text.contains(t)).collect()
}

fn keyword_signal(text: &str, terms: &[&str], saturation: usize) -> Signal {
    let mut signal = Signal::new(saturation);
    let found = matched_terms(text, terms);
    if !found.is_empty() {
        signal.add(found.len(), format!("mentions {}", found.join(", ")));
    }
    signal
}

fn quantified_outcomes(h: &Hypothesis, terms: &[&str]) -> Vec<String> {
    h.predicted_outcomes
        .iter()
        .filter(|o| {
            let metric = o.metric.to_lowercase();
            terms.iter().any(|t| metric.contains(t)) && o.value.is_finite()
        })
        .map(|o| format!("{} = {} {}", o.metric, o.value, o.unit).trim().to_string())
        .collect()
}

fn param_signal(signal: &mut Signal, h: &Hypothesis, names: &[&str]) {
    let present: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| h.parameters.contains_key(*n))
        .collect();
    if !present.is_empty() {
        signal.add(1, format!("simulation parameters: {}", present.join(", ")));
    }
}

fn significant_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 4)
        .map(|w| w.to_lowercase())
        .collect()
}

fn score_quantified(
    dimension: DimensionId,
    h: &Hypothesis,
    text: &str,
    terms: &[&str],
    params: &[&str],
    gap: &str,
) -> DimensionScore {
    let mut signal = Signal::new(6);
    let outcomes = quantified_outcomes(h, terms);
    for outcome in outcomes.iter().take(2) {
        signal.add(2, format!("predicts {outcome}"));
    }
    param_signal(&mut signal, h, params);
    let found = matched_terms(text, terms);
    if !found.is_empty() {
        signal.add(found.len().min(2), format!("mentions {}", found.join(", ")));
    }
    signal.into_score(dimension, gap)
}

fn score_problem_solving(h: &Hypothesis, problem: &str) -> DimensionScore {
    let mut signal = Signal::new(5);
    let mechanism_len = h.mechanism.trim().len();
    if mechanism_len >= 80 {
        signal.add(2, "explicit mechanism");
    } else if mechanism_len >= 20 {
        signal.add(1, "brief mechanism");
    }
    if !problem.trim().is_empty() {
        let problem_words = significant_words(problem);
        let overlap = significant_words(&h.full_text())
            .intersection(&problem_words)
            .count();
        signal.add(overlap.min(3), format!("addresses {overlap} problem terms"));
    }
    signal.into_score(
        DimensionId::ProblemSolving,
        "No explicit mechanism tied to the stated problem",
    )
}

fn score_evidence(h: &Hypothesis) -> DimensionScore {
    let mut signal = Signal::new(6);
    let evidence = h.supporting_evidence.len().min(3);
    signal.add(evidence, format!("{} supporting references", h.supporting_evidence.len()));
    let steps = h.validation_plan.len().min(2);
    signal.add(steps, format!("{} validation steps", h.validation_plan.len()));
    if !h.risks.is_empty() {
        signal.add(1, format!("{} risks acknowledged", h.risks.len()));
    }
    signal.into_score(
        DimensionId::EvidenceQuality,
        "Cite supporting data and give a concrete validation plan",
    )
}

/// Score one dimension deterministically.
pub fn score_dimension(dimension: DimensionId, h: &Hypothesis, problem: &str) -> DimensionScore {
    let text = h.full_text().to_lowercase();
    score_dimension_with_text(dimension, h, problem, &text)
}

fn score_dimension_with_text(
    dimension: DimensionId,
    h: &Hypothesis,
    problem: &str,
    text: &str,
) -> DimensionScore {
    match dimension {
        DimensionId::PerformanceGains => score_quantified(
            dimension,
            h,
            text,
            PERFORMANCE_TERMS,
            PERFORMANCE_PARAMS,
            "Quantify the performance gain over the current state of the art",
        ),
        DimensionId::CostReduction => score_quantified(
            dimension,
            h,
            text,
            COST_TERMS,
            COST_PARAMS,
            "Quantify the cost reduction (capex, opex, or LCOE)",
        ),
        DimensionId::AdvancedCapabilities => keyword_signal(text, CAPABILITY_TERMS, 4)
            .into_score(dimension, "State what becomes possible that was not before"),
        DimensionId::NewApplications => keyword_signal(text, APPLICATION_TERMS, 4)
            .into_score(dimension, "Name concrete new applications or markets"),
        DimensionId::SocietalImpact => keyword_signal(text, SOCIETAL_TERMS, 4)
            .into_score(dimension, "Describe emissions, access, or health effects"),
        DimensionId::OpportunityScale => keyword_signal(text, SCALE_TERMS, 4)
            .into_score(dimension, "Size the deployable opportunity"),
        DimensionId::ProblemSolving => score_problem_solving(h, problem),
        DimensionId::KnowledgeTrajectory => {
            let mut signal = keyword_signal(text, TRAJECTORY_TERMS, 4);
            if h.version > 1 {
                signal.add(1, format!("refined through {} versions", h.version));
            }
            signal.into_score(dimension, "Relate the idea to the current research trajectory")
        }
        DimensionId::EvidenceQuality => score_evidence(h),
    }
}

/// Score every dimension. The result always has one entry per dimension.
pub fn score_all(h: &Hypothesis, problem: &str) -> BTreeMap<DimensionId, DimensionScore> {
    let text = h.full_text().to_lowercase();
    DimensionId::ALL
        .iter()
        .map(|&d| (d, score_dimension_with_text(d, h, problem, &text)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AgentSource, PredictedOutcome};
    use crate::score::dimensions::DIMENSIONS;

    fn bare() -> Hypothesis {
        Hypothesis::new("a", AgentSource::Incremental, "x", "y")
    }

    fn rich() -> Hypothesis {
        let mut h = Hypothesis::new(
            "a",
            AgentSource::FirstPrinciples,
            "Perovskite-silicon tandem with self-healing passivation",
            "A tandem cell reaching 33% efficiency at 40% lower LCOE, enabling \
             utility-scale deployment worldwide and cutting carbon emissions.",
        );
        h.mechanism = "Self-healing 2D passivation layers suppress ion migration at the \
                       perovskite grain boundaries, stabilising the top cell for 25 years."
            .into();
        h.predicted_outcomes = vec![
            PredictedOutcome {
                metric: "cell efficiency".into(),
                value: 33.0,
                unit: "%".into(),
            },
            PredictedOutcome {
                metric: "LCOE".into(),
                value: 0.025,
                unit: "$/kWh".into(),
            },
        ];
        h.supporting_evidence = vec![
            "NREL record chart 2024".into(),
            "Published study on 2D passivation".into(),
        ];
        h.validation_plan = vec!["1000h damp heat".into(), "Outdoor pilot".into()];
        h.risks = vec!["Lead leakage".into()];
        h.parameters.insert("efficiency_mean".into(), 0.33);
        h.parameters.insert("cost_mean".into(), 60.0);
        h
    }

    #[test]
    fn test_every_dimension_scored() {
        let scores = score_all(&bare(), "");
        assert_eq!(scores.len(), DIMENSIONS.len());
    }

    #[test]
    fn test_empty_hypothesis_gets_lowest_nonzero_band() {
        for score in score_all(&bare(), "").values() {
            assert_eq!(score.percentage, NO_SIGNAL_PERCENT);
            assert!(score.points > 0.0);
            assert!(!score.gaps.is_empty());
        }
    }

    #[test]
    fn test_rich_hypothesis_scores_required_dimensions_high() {
        let h = rich();
        let scores = score_all(&h, "Make solar cheaper and more efficient");
        assert!(scores[&DimensionId::PerformanceGains].percentage >= 70.0);
        assert!(scores[&DimensionId::CostReduction].percentage >= 70.0);
        assert!(scores[&DimensionId::EvidenceQuality].percentage >= 70.0);
        assert!(scores[&DimensionId::SocietalImpact].percentage > NO_SIGNAL_PERCENT);
    }

    #[test]
    fn test_problem_overlap_raises_problem_solving() {
        let h = rich();
        let unrelated = score_dimension(DimensionId::ProblemSolving, &h, "");
        let related = score_dimension(
            DimensionId::ProblemSolving,
            &h,
            "Stabilise perovskite tandem cells against migration",
        );
        assert!(related.percentage > unrelated.percentage);
    }

    #[test]
    fn test_scores_are_deterministic() {
        let h = rich();
        assert_eq!(score_all(&h, "p"), score_all(&h, "p"));
    }

    #[test]
    fn test_signal_percent_saturates() {
        let mut s = Signal::new(2);
        s.add(5, "lots");
        assert_eq!(s.percent(), 100.0);
    }
}
