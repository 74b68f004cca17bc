// src/evaluator/feedback.rs — Refinement feedback derived from an evaluation

use serde::{Deserialize, Serialize};

use super::Evaluation;
use crate::score::{Classification, DimensionId};

/// What an agent needs to improve one hypothesis in the next iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementFeedback {
    pub hypothesis_id: String,
    pub iteration: u32,
    pub overall_score: f64,
    pub classification: Classification,
    pub weakest: Vec<DimensionId>,
    pub strongest: Vec<DimensionId>,
    pub suggestions: Vec<String>,
    /// Gaps on the weakest dimensions, prefixed by dimension name.
    pub gaps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_summary: Option<String>,
}

pub fn generate_feedback(evaluation: &Evaluation, history_summary: Option<String>) -> RefinementFeedback {
    let gaps = evaluation
        .weakest
        .iter()
        .filter_map(|d| evaluation.dimensions.get(d))
        .flat_map(|s| {
            let name = s.dimension.def().name;
            s.gaps.iter().map(move |g| format!("{name}: {g}"))
        })
        .collect();

    RefinementFeedback {
        hypothesis_id: evaluation.hypothesis_id.clone(),
        iteration: evaluation.iteration,
        overall_score: evaluation.overall_score,
        classification: evaluation.classification,
        weakest: evaluation.weakest.clone(),
        strongest: evaluation.strongest.clone(),
        suggestions: evaluation.recommendations.clone(),
        gaps,
        history_summary,
    }
}

impl RefinementFeedback {
    /// Prompt-ready rendering for refinement templates.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Current score: {:.2}/10 ({})\n",
            self.overall_score,
            self.classification
        );
        if !self.weakest.is_empty() {
            let names: Vec<_> = self.weakest.iter().map(|d| d.def().name).collect();
            out.push_str(&format!("Weakest dimensions: {}\n", names.join(", ")));
        }
        if !self.strongest.is_empty() {
            let names: Vec<_> = self.strongest.iter().map(|d| d.def().name).collect();
            out.push_str(&format!("Keep strengths: {}\n", names.join(", ")));
        }
        for s in &self.suggestions {
            out.push_str(&format!("- {s}\n"));
        }
        for g in &self.gaps {
            out.push_str(&format!("- Gap: {g}\n"));
        }
        if let Some(history) = &self.history_summary {
            out.push_str("\nPrevious iterations:\n");
            out.push_str(history);
            out.push('\n');
        }
        out
    }
}
