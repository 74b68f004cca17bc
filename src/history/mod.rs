// src/history/mod.rs — Append-only per-hypothesis iteration log
//
// Grounds refinement prompts with what changed between versions and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::types::Hypothesis;
use crate::evaluator::RefinementFeedback;
use crate::score::{Classification, DimensionId};

/// Score change beyond which a hypothesis counts as moving.
pub const TRAJECTORY_THRESHOLD: f64 = 0.2;

/// Records rendered into a refinement prompt.
pub const DEFAULT_SUMMARY_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trajectory {
    Improving,
    Stable,
    Declining,
}

impl Trajectory {
    pub fn from_delta(delta: f64) -> Self {
        if delta > TRAJECTORY_THRESHOLD {
            Trajectory::Improving
        } else if delta < -TRAJECTORY_THRESHOLD {
            Trajectory::Declining
        } else {
            Trajectory::Stable
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Trajectory::Improving => "improving",
            Trajectory::Stable => "stable",
            Trajectory::Declining => "declining",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    Improved,
    Degraded,
    Maintained,
    Breakthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDiff {
    pub dimension: DimensionId,
    pub previous: Option<f64>,
    pub current: f64,
    pub resolved_gaps: Vec<String>,
    pub remaining_gaps: Vec<String>,
}

impl DimensionDiff {
    pub fn change(&self) -> f64 {
        self.previous.map(|p| self.current - p).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub hypothesis_id: String,
    pub iteration: u32,
    pub version: u32,
    pub overall_score: f64,
    pub score_delta: f64,
    pub trajectory: Trajectory,
    pub classification: Option<Classification>,
    pub percentages: BTreeMap<DimensionId, f64>,
    pub gaps: BTreeMap<DimensionId, Vec<String>>,
    pub dimension_diffs: Vec<DimensionDiff>,
    pub outcome: IterationOutcome,
    pub lesson: String,
    /// Suggestions that were handed to the agent for this version.
    pub feedback_applied: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrder {
    Chronological,
    /// Ascending by score: worst to best.
    Improving,
}

#[derive(Debug)]
pub struct HypothesisHistoryManager {
    records: HashMap<String, Vec<IterationRecord>>,
    summary_window: usize,
}

impl Default for HypothesisHistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_WINDOW)
    }
}

impl HypothesisHistoryManager {
    pub fn new(summary_window: usize) -> Self {
        Self {
            records: HashMap::new(),
            summary_window: summary_window.max(1),
        }
    }

    /// Append a record for the hypothesis' current scores.
    pub fn record_iteration(
        &mut self,
        hypothesis: &Hypothesis,
        feedback: Option<&RefinementFeedback>,
    ) -> IterationRecord {
        let previous = self
            .records
            .get(&hypothesis.id)
            .and_then(|log| log.last());

        let overall_score = hypothesis.overall_score();
        let score_delta = previous
            .map(|p| overall_score - p.overall_score)
            .unwrap_or(0.0);
        let trajectory = Trajectory::from_delta(score_delta);
        let classification = hypothesis.classification();

        let (percentages, gaps) = match &hypothesis.scores {
            Some(scores) => (
                scores
                    .dimensions
                    .iter()
                    .map(|(d, s)| (*d, s.percentage))
                    .collect(),
                scores
                    .dimensions
                    .iter()
                    .map(|(d, s)| (*d, s.gaps.clone()))
                    .collect(),
            ),
            None => (BTreeMap::new(), BTreeMap::new()),
        };

        let dimension_diffs = diff_dimensions(previous, &percentages, &gaps);

        let outcome = match (classification, trajectory) {
            (Some(Classification::Breakthrough), _) => IterationOutcome::Breakthrough,
            (_, Trajectory::Improving) => IterationOutcome::Improved,
            (_, Trajectory::Declining) => IterationOutcome::Degraded,
            (_, Trajectory::Stable) => IterationOutcome::Maintained,
        };
        let lesson = derive_lesson(outcome, previous.is_none(), overall_score, &dimension_diffs);

        let record = IterationRecord {
            hypothesis_id: hypothesis.id.clone(),
            iteration: hypothesis.iteration,
            version: hypothesis.version,
            overall_score,
            score_delta,
            trajectory,
            classification,
            percentages,
            gaps,
            dimension_diffs,
            outcome,
            lesson,
            feedback_applied: feedback.map(|f| f.suggestions.clone()).unwrap_or_default(),
            recorded_at: Utc::now(),
        };

        tracing::debug!(
            hypothesis_id = %record.hypothesis_id,
            version = record.version,
            delta = record.score_delta,
            outcome = ?record.outcome,
            "Recorded iteration"
        );

        self.records
            .entry(hypothesis.id.clone())
            .or_default()
            .push(record.clone());
        record
    }

    pub fn records(&self, hypothesis_id: &str, order: HistoryOrder) -> Vec<IterationRecord> {
        let mut records = self
            .records
            .get(hypothesis_id)
            .cloned()
            .unwrap_or_default();
        if order == HistoryOrder::Improving {
            records.sort_by(|a, b| a.overall_score.total_cmp(&b.overall_score));
        }
        records
    }

    pub fn latest(&self, hypothesis_id: &str) -> Option<&IterationRecord> {
        self.records.get(hypothesis_id).and_then(|log| log.last())
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    /// Prompt-ready summary of the last few records, oldest first.
    pub fn format_prompt_summary(&self, hypothesis_id: &str) -> Option<String> {
        let log = self.records.get(hypothesis_id)?;
        if log.is_empty() {
            return None;
        }
        let start = log.len().saturating_sub(self.summary_window);
        let lines: Vec<String> = log[start..]
            .iter()
            .map(|r| {
                format!(
                    "Iteration {} (v{}): {:.2} ({:+.2}, {}). {}",
                    r.iteration,
                    r.version,
                    r.overall_score,
                    r.score_delta,
                    r.trajectory.as_str(),
                    r.lesson
                )
            })
            .collect();
        Some(lines.join("\n"))
    }
}

fn diff_dimensions(
    previous: Option<&IterationRecord>,
    percentages: &BTreeMap<DimensionId, f64>,
    gaps: &BTreeMap<DimensionId, Vec<String>>,
) -> Vec<DimensionDiff> {
    percentages
        .iter()
        .map(|(d, current)| {
            let remaining = gaps.get(d).cloned().unwrap_or_default();
            let resolved = previous
                .and_then(|p| p.gaps.get(d))
                .map(|old| {
                    old.iter()
                        .filter(|g| !remaining.contains(g))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            DimensionDiff {
                dimension: *d,
                previous: previous.and_then(|p| p.percentages.get(d).copied()),
                current: *current,
                resolved_gaps: resolved,
                remaining_gaps: remaining,
            }
        })
        .collect()
}

fn derive_lesson(
    outcome: IterationOutcome,
    first: bool,
    overall: f64,
    diffs: &[DimensionDiff],
) -> String {
    let biggest_gain = diffs
        .iter()
        .filter(|d| d.change() > 0.0)
        .max_by(|a, b| a.change().total_cmp(&b.change()));
    let biggest_drop = diffs
        .iter()
        .filter(|d| d.change() < 0.0)
        .min_by(|a, b| a.change().total_cmp(&b.change()));
    let weakest = diffs
        .iter()
        .min_by(|a, b| a.current.total_cmp(&b.current));

    if first {
        return match weakest {
            Some(w) => format!(
                "Baseline {overall:.2}; weakest on {}",
                w.dimension.def().name
            ),
            None => format!("Baseline {overall:.2}"),
        };
    }

    match outcome {
        IterationOutcome::Breakthrough => format!("Reached breakthrough range at {overall:.2}"),
        IterationOutcome::Improved => match biggest_gain {
            Some(g) => format!(
                "Gain driven by {} ({:+.0} pts)",
                g.dimension.def().name,
                g.change()
            ),
            None => "Score rose without a single dominant dimension".into(),
        },
        IterationOutcome::Degraded => match biggest_drop {
            Some(d) => format!(
                "Regressed on {} ({:+.0} pts); restore what was removed",
                d.dimension.def().name,
                d.change()
            ),
            None => "Score fell without a single dominant dimension".into(),
        },
        IterationOutcome::Maintained => match weakest {
            Some(w) => format!("No material change; target {}", w.dimension.def().name),
            None => "No material change".into(),
        },
    }
}
