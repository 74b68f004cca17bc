// src/core/review.rs — Post-race expert review checkpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::Hypothesis;
use crate::infra::errors::RaceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Promote to breakthrough candidate.
    Approve,
    /// Eliminate with the reviewer's reason.
    Reject { reason: String },
    /// Keep active and store suggestions for a later pass.
    Refine { suggestions: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertReview {
    pub hypothesis_id: String,
    #[serde(flatten)]
    pub decision: ReviewDecision,
}

/// External reviewer consulted once after the iteration loop.
#[async_trait]
pub trait ExpertReviewer: Send + Sync {
    /// Reviews for any subset of `hypotheses`; unknown ids are ignored.
    async fn review(&self, hypotheses: &[Hypothesis]) -> Result<Vec<ExpertReview>, RaceError>;
}
