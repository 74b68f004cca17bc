// src/bus/message.rs — Feedback bus message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::RaceStatus;
use crate::evaluator::feedback::RefinementFeedback;
use crate::score::Classification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    EvaluationComplete,
    RefinementReady,
    HypothesisEliminated,
    BreakthroughFound,
    IterationComplete,
    RaceUpdate,
    GpuValidationComplete,
    Error,
}

/// Delivery priority. Declaration order is ascending so `Ord` compares by
/// urgency.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Highest first.
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    pub(crate) fn band(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Broadcast,
    Agents(Vec<String>),
}

impl Target {
    pub fn agent(id: impl Into<String>) -> Self {
        Target::Agents(vec![id.into()])
    }

    pub fn includes(&self, agent_id: &str) -> bool {
        match self {
            Target::Broadcast => true,
            Target::Agents(ids) => ids.iter().any(|id| id == agent_id),
        }
    }
}

/// One variant per message type; the type is derived from the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    EvaluationComplete {
        hypothesis_id: String,
        overall_score: f64,
        classification: Classification,
    },
    RefinementReady(RefinementFeedback),
    HypothesisEliminated {
        hypothesis_id: String,
        score: f64,
        reason: String,
    },
    BreakthroughFound {
        hypothesis_id: String,
        score: f64,
    },
    IterationComplete {
        iteration: u32,
        active: usize,
        eliminated: usize,
        breakthroughs: usize,
    },
    RaceUpdate {
        status: RaceStatus,
        message: String,
    },
    GpuValidationComplete {
        validated: usize,
        skipped: bool,
    },
    Error {
        message: String,
    },
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::EvaluationComplete { .. } => MessageType::EvaluationComplete,
            Payload::RefinementReady(_) => MessageType::RefinementReady,
            Payload::HypothesisEliminated { .. } => MessageType::HypothesisEliminated,
            Payload::BreakthroughFound { .. } => MessageType::BreakthroughFound,
            Payload::IterationComplete { .. } => MessageType::IterationComplete,
            Payload::RaceUpdate { .. } => MessageType::RaceUpdate,
            Payload::GpuValidationComplete { .. } => MessageType::GpuValidationComplete,
            Payload::Error { .. } => MessageType::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub id: String,
    pub source: String,
    pub target: Target,
    pub payload: Payload,
    pub priority: Priority,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackMessage {
    pub fn new(source: impl Into<String>, target: Target, payload: Payload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            target,
            payload,
            priority: Priority::Normal,
            iteration: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}
