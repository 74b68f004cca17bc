// src/gpu/mod.rs — Tiered GPU validation: types and the pool seam

pub mod bridge;
pub mod modal;
pub mod pool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::infra::errors::RaceError;

pub use bridge::{BridgeConfig, GpuValidationBridge, ValidationOutcome};
pub use pool::{TieredGpuPool, ValidationBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuTier {
    T4,
    A10G,
    A100,
}

impl GpuTier {
    pub const ALL: [GpuTier; 3] = [GpuTier::T4, GpuTier::A10G, GpuTier::A100];

    pub fn as_str(&self) -> &'static str {
        match self {
            GpuTier::T4 => "t4",
            GpuTier::A10G => "a10g",
            GpuTier::A100 => "a100",
        }
    }

    pub fn cost_per_hour(&self) -> f64 {
        match self {
            GpuTier::T4 => 0.40,
            GpuTier::A10G => 1.10,
            GpuTier::A100 => 3.00,
        }
    }

    /// Higher scores earn the more accurate (and expensive) tier.
    pub fn for_score(score: f64) -> GpuTier {
        if score >= 9.0 {
            GpuTier::A100
        } else if score >= 8.0 {
            GpuTier::A10G
        } else {
            GpuTier::T4
        }
    }

    pub fn cost_for(&self, duration_ms: u64) -> f64 {
        self.cost_per_hour() * duration_ms as f64 / 3_600_000.0
    }
}

impl std::fmt::Display for GpuTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationType {
    Quick,
    Full,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationType::Quick => "quick",
            ValidationType::Full => "full",
        }
    }
}

/// What gets shipped to the validator for one hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub hypothesis_id: String,
    pub statement: String,
    pub parameters: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub tier: GpuTier,
    pub validation_type: ValidationType,
    pub iteration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuValidationResult {
    pub hypothesis_id: String,
    pub physics_valid: bool,
    pub economically_viable: bool,
    /// 0-1.
    pub confidence_score: f64,
    pub tier: GpuTier,
    pub cost_usd: f64,
    pub from_cache: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub metrics: serde_json::Value,
}

/// External tiered validation pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GpuPool: Send + Sync {
    fn select_tier_by_score(&self, score: f64) -> GpuTier {
        GpuTier::for_score(score)
    }

    fn has_capacity(&self, tier: GpuTier) -> bool;

    async fn validate(
        &self,
        requests: Vec<ValidationRequest>,
        context: ValidationContext,
    ) -> Result<Vec<GpuValidationResult>, RaceError>;

    async fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_by_score() {
        assert_eq!(GpuTier::for_score(9.5), GpuTier::A100);
        assert_eq!(GpuTier::for_score(9.0), GpuTier::A100);
        assert_eq!(GpuTier::for_score(8.99), GpuTier::A10G);
        assert_eq!(GpuTier::for_score(8.0), GpuTier::A10G);
        assert_eq!(GpuTier::for_score(7.5), GpuTier::T4);
    }

    #[test]
    fn test_tier_cost_rises_with_accuracy() {
        assert!(GpuTier::T4.cost_per_hour() < GpuTier::A10G.cost_per_hour());
        assert!(GpuTier::A10G.cost_per_hour() < GpuTier::A100.cost_per_hour());
        assert!((GpuTier::A100.cost_for(3_600_000) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tier_serde() {
        assert_eq!(serde_json::to_string(&GpuTier::A10G).unwrap(), "\"a10g\"");
    }
}
