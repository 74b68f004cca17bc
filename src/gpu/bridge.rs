// src/gpu/bridge.rs — Mid-race GPU validation: eligibility, batching, score adjustment
//
// The bridge only returns data. Applying adjustments to the race table is the
// arena's job.

use std::sync::Arc;

use super::{GpuPool, GpuTier, GpuValidationResult, ValidationContext, ValidationRequest, ValidationType};
use crate::core::types::Hypothesis;
use crate::infra::config::GpuSection;
use crate::infra::errors::RaceError;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub start_iteration: u32,
    pub score_threshold: f64,
    /// Largest absolute change a validation result can make to an overall score.
    pub max_adjustment: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from(&GpuSection::default())
    }
}

impl From<&GpuSection> for BridgeConfig {
    fn from(section: &GpuSection) -> Self {
        Self {
            start_iteration: section.start_iteration,
            score_threshold: section.score_threshold,
            max_adjustment: section.max_adjustment.abs(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// Nothing was submitted; scores are untouched.
    Skipped { reason: String },
    Completed {
        tier: GpuTier,
        results: Vec<GpuValidationResult>,
        /// `(hypothesis_id, adjustment)` in result order.
        adjustments: Vec<(String, f64)>,
        total_cost: f64,
    },
    /// The batch call failed; every submitted hypothesis is unvalidated.
    Failed {
        tier: GpuTier,
        unvalidated: Vec<String>,
        error: String,
    },
}

impl ValidationOutcome {
    pub fn validated_count(&self) -> usize {
        match self {
            ValidationOutcome::Completed { results, .. } => results.len(),
            _ => 0,
        }
    }
}

pub struct GpuValidationBridge {
    pool: Arc<dyn GpuPool>,
    config: BridgeConfig,
}

impl GpuValidationBridge {
    pub fn new(pool: Arc<dyn GpuPool>, config: BridgeConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_due(&self, iteration: u32) -> bool {
        iteration >= self.config.start_iteration
    }

    pub fn select_eligible<'a>(&self, hypotheses: &'a [Hypothesis]) -> Vec<&'a Hypothesis> {
        hypotheses
            .iter()
            .filter(|h| h.overall_score() >= self.config.score_threshold)
            .collect()
    }

    /// Bounded delta for one result: rewards confident viable results,
    /// penalises non-viable and physically invalid ones.
    pub fn score_adjustment(&self, result: &GpuValidationResult) -> f64 {
        let max = self.config.max_adjustment;
        let delta = match (result.physics_valid, result.economically_viable) {
            (true, true) => max * result.confidence_score.clamp(0.0, 1.0),
            (true, false) => -max * 0.5,
            (false, _) => -max,
        };
        delta.clamp(-max, max)
    }

    pub async fn validate_iteration(
        &self,
        hypotheses: &[Hypothesis],
        iteration: u32,
    ) -> ValidationOutcome {
        if !self.is_due(iteration) {
            return ValidationOutcome::Skipped {
                reason: format!(
                    "validation starts at iteration {}",
                    self.config.start_iteration
                ),
            };
        }

        let eligible = self.select_eligible(hypotheses);
        let Some(top_score) = eligible
            .iter()
            .map(|h| h.overall_score())
            .max_by(|a, b| a.total_cmp(b))
        else {
            return ValidationOutcome::Skipped {
                reason: format!(
                    "no hypothesis at or above {:.1}",
                    self.config.score_threshold
                ),
            };
        };

        let tier = self.pool.select_tier_by_score(top_score);
        if !self.pool.has_capacity(tier) {
            tracing::warn!(iteration, %tier, "GPU tier saturated, skipping validation");
            return ValidationOutcome::Skipped {
                reason: format!("GPU tier {tier} has no free capacity"),
            };
        }

        let requests: Vec<ValidationRequest> = eligible
            .iter()
            .map(|h| ValidationRequest {
                hypothesis_id: h.id.clone(),
                statement: h.statement.clone(),
                parameters: h.parameters.clone(),
            })
            .collect();
        let submitted: Vec<String> = requests.iter().map(|r| r.hypothesis_id.clone()).collect();
        let context = ValidationContext {
            tier,
            validation_type: if tier == GpuTier::A100 {
                ValidationType::Full
            } else {
                ValidationType::Quick
            },
            iteration,
        };

        match self.pool.validate(requests, context).await {
            Ok(results) => {
                let adjustments = results
                    .iter()
                    .map(|r| (r.hypothesis_id.clone(), self.score_adjustment(r)))
                    .collect();
                let total_cost = results.iter().map(|r| r.cost_usd).sum();
                tracing::info!(
                    iteration,
                    %tier,
                    validated = results.len(),
                    cost_usd = total_cost,
                    "GPU validation complete"
                );
                ValidationOutcome::Completed {
                    tier,
                    results,
                    adjustments,
                    total_cost,
                }
            }
            Err(RaceError::GpuCapacity { tier: t }) => {
                tracing::warn!(iteration, tier = %t, "GPU tier filled before submission, skipping");
                ValidationOutcome::Skipped {
                    reason: format!("GPU tier {t} has no free capacity"),
                }
            }
            Err(e) => {
                tracing::warn!(iteration, %tier, error = %e, "GPU batch failed, hypotheses left unvalidated");
                ValidationOutcome::Failed {
                    tier,
                    unvalidated: submitted,
                    error: e.to_string(),
                }
            }
        }
    }

    pub async fn stop(&self) {
        self.pool.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AgentSource, HypothesisScores};
    use crate::gpu::MockGpuPool;
    use crate::score::Classification;
    use std::collections::BTreeMap;

    fn scored(title: &str, overall: f64) -> Hypothesis {
        let mut h = Hypothesis::new("agent", AgentSource::Synthesis, title, "s");
        h.scores = Some(HypothesisScores {
            overall,
            dimensions: BTreeMap::new(),
            gpu_adjustment: 0.0,
            classification: Classification::GeneralInsights,
            evaluated_iteration: 1,
        });
        h
    }

    fn result(id: &str, physics: bool, viable: bool, confidence: f64) -> GpuValidationResult {
        GpuValidationResult {
            hypothesis_id: id.into(),
            physics_valid: physics,
            economically_viable: viable,
            confidence_score: confidence,
            tier: GpuTier::T4,
            cost_usd: 0.01,
            from_cache: false,
            duration_ms: 90,
            metrics: serde_json::Value::Null,
        }
    }

    fn bridge(pool: MockGpuPool) -> GpuValidationBridge {
        GpuValidationBridge::new(Arc::new(pool), BridgeConfig::default())
    }

    #[test]
    fn test_score_adjustment_is_bounded() {
        let b = bridge(MockGpuPool::new());
        assert!((b.score_adjustment(&result("a", true, true, 0.8)) - 0.4).abs() < 1e-9);
        assert!((b.score_adjustment(&result("a", true, true, 7.0)) - 0.5).abs() < 1e-9);
        assert!((b.score_adjustment(&result("a", true, false, 0.9)) + 0.25).abs() < 1e-9);
        assert!((b.score_adjustment(&result("a", false, true, 0.9)) + 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_not_due_before_start_iteration() {
        let b = bridge(MockGpuPool::new());
        let outcome = b.validate_iteration(&[scored("a", 9.0)], 1).await;
        assert!(matches!(outcome, ValidationOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_nothing_eligible_is_skipped() {
        let b = bridge(MockGpuPool::new());
        let outcome = b.validate_iteration(&[scored("a", 6.9)], 2).await;
        assert!(matches!(outcome, ValidationOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_capacity_exhausted_skips_without_submitting() {
        let mut pool = MockGpuPool::new();
        pool.expect_select_tier_by_score()
            .returning(GpuTier::for_score);
        pool.expect_has_capacity()
            .withf(|t| *t == GpuTier::A10G)
            .times(1)
            .returning(|_| false);
        pool.expect_validate().never();

        let b = bridge(pool);
        let outcome = b
            .validate_iteration(&[scored("a", 8.4), scored("b", 7.2)], 2)
            .await;
        match outcome {
            ValidationOutcome::Skipped { reason } => assert!(reason.contains("a10g")),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_batch_uses_top_score_tier_and_adjusts() {
        let mut pool = MockGpuPool::new();
        pool.expect_select_tier_by_score()
            .returning(GpuTier::for_score);
        pool.expect_has_capacity().returning(|_| true);
        pool.expect_validate()
            .withf(|reqs, ctx| {
                reqs.len() == 2
                    && ctx.tier == GpuTier::A100
                    && ctx.validation_type == ValidationType::Full
            })
            .times(1)
            .returning(|reqs, _| {
                Ok(reqs
                    .iter()
                    .map(|r| result(&r.hypothesis_id, true, true, 1.0))
                    .collect())
            });

        let b = bridge(pool);
        let hyps = vec![scored("a", 9.1), scored("b", 7.5), scored("c", 3.0)];
        let outcome = b.validate_iteration(&hyps, 3).await;
        match outcome {
            ValidationOutcome::Completed {
                tier, adjustments, ..
            } => {
                assert_eq!(tier, GpuTier::A100);
                assert_eq!(adjustments.len(), 2);
                assert!(adjustments.iter().all(|(_, a)| (*a - 0.5).abs() < 1e-9));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_batch_failure_marks_all_unvalidated() {
        let mut pool = MockGpuPool::new();
        pool.expect_select_tier_by_score()
            .returning(GpuTier::for_score);
        pool.expect_has_capacity().returning(|_| true);
        pool.expect_validate()
            .returning(|_, _| Err(RaceError::Gpu("HTTP 502".into())));

        let b = bridge(pool);
        let hyps = vec![scored("a", 8.0), scored("b", 7.0)];
        let outcome = b.validate_iteration(&hyps, 2).await;
        assert_eq!(outcome.validated_count(), 0);
        match outcome {
            ValidationOutcome::Failed { unvalidated, .. } => {
                assert_eq!(unvalidated, vec![hyps[0].id.clone(), hyps[1].id.clone()]);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_delegates_to_pool() {
        let mut pool = MockGpuPool::new();
        pool.expect_stop().times(1).returning(|| ());
        bridge(pool).stop().await;
    }
}
