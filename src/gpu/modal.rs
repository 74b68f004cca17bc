// src/gpu/modal.rs — HTTP validation backend (batch-hypothesis-validation)

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

use super::pool::ValidationBackend;
use super::{GpuValidationResult, ValidationContext, ValidationRequest};
use crate::infra::errors::RaceError;

pub struct HttpValidationBackend {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    hypothesis_id: Option<String>,
    #[serde(default)]
    physics_valid: bool,
    #[serde(default)]
    economically_viable: bool,
    #[serde(default)]
    confidence_score: f64,
    #[serde(default)]
    metrics: serde_json::Value,
}

impl HttpValidationBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self) -> String {
        format!("{}/batch-hypothesis-validation", self.endpoint)
    }

    fn build_body(requests: &[ValidationRequest], context: ValidationContext) -> serde_json::Value {
        let hypotheses: Vec<serde_json::Value> = requests
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.hypothesis_id,
                    "parameters": r.parameters,
                })
            })
            .collect();
        serde_json::json!({
            "args": {
                "hypotheses": hypotheses,
                "validation_type": context.validation_type.as_str(),
                "gpu_tier": context.tier.as_str(),
            }
        })
    }
}

/// Convert raw service rows into results, splitting the batch's wall time
/// evenly across hypotheses for cost accounting.
fn into_results(
    raw: Vec<RawResult>,
    context: ValidationContext,
    elapsed_ms: u64,
) -> Vec<GpuValidationResult> {
    let per_item_ms = elapsed_ms / raw.len().max(1) as u64;
    raw.into_iter()
        .filter_map(|r| {
            let hypothesis_id = r.hypothesis_id?;
            Some(GpuValidationResult {
                hypothesis_id,
                physics_valid: r.physics_valid,
                economically_viable: r.economically_viable,
                confidence_score: r.confidence_score.clamp(0.0, 1.0),
                tier: context.tier,
                cost_usd: context.tier.cost_for(per_item_ms),
                from_cache: false,
                duration_ms: per_item_ms,
                metrics: r.metrics,
            })
        })
        .collect()
}

#[async_trait]
impl ValidationBackend for HttpValidationBackend {
    async fn run(
        &self,
        requests: &[ValidationRequest],
        context: ValidationContext,
    ) -> Result<Vec<GpuValidationResult>, RaceError> {
        let started = Instant::now();
        let response = self
            .client
            .post(self.url())
            .json(&Self::build_body(requests, context))
            .send()
            .await
            .map_err(|e| RaceError::Gpu(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RaceError::Gpu(format!("HTTP {status}: {body}")));
        }

        let raw: Vec<RawResult> = response
            .json()
            .await
            .map_err(|e| RaceError::Gpu(format!("invalid response: {e}")))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            tier = %context.tier,
            hypotheses = requests.len(),
            elapsed_ms,
            "GPU batch validated"
        );
        Ok(into_results(raw, context, elapsed_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuTier, ValidationType};
    use std::collections::BTreeMap;

    fn ctx() -> ValidationContext {
        ValidationContext {
            tier: GpuTier::A10G,
            validation_type: ValidationType::Full,
            iteration: 3,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let mut parameters = BTreeMap::new();
        parameters.insert("target_lcoe".to_string(), 0.04);
        let body = HttpValidationBackend::build_body(
            &[ValidationRequest {
                hypothesis_id: "h1".into(),
                statement: "s".into(),
                parameters,
            }],
            ctx(),
        );
        assert_eq!(body["args"]["validation_type"], "full");
        assert_eq!(body["args"]["gpu_tier"], "a10g");
        assert_eq!(body["args"]["hypotheses"][0]["id"], "h1");
        assert_eq!(body["args"]["hypotheses"][0]["parameters"]["target_lcoe"], 0.04);
    }

    #[test]
    fn test_parse_service_rows() {
        let json = r#"[
            {"hypothesis_id": "h1", "validation_type": "full", "physics_valid": true,
             "economically_viable": false, "confidence_score": 1.7,
             "metrics": {"lcoe": {"median": 0.05}}},
            {"validation_type": "full"}
        ]"#;
        let raw: Vec<RawResult> = serde_json::from_str(json).unwrap();
        let results = into_results(raw, ctx(), 2_000);
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!(r.physics_valid);
        assert!(!r.economically_viable);
        assert_eq!(r.confidence_score, 1.0);
        assert_eq!(r.tier, GpuTier::A10G);
        assert_eq!(r.duration_ms, 1_000);
        assert_eq!(r.metrics["lcoe"]["median"], 0.05);
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let b = HttpValidationBackend::new("https://gpu.example.com/", Duration::from_secs(1));
        assert_eq!(b.url(), "https://gpu.example.com/batch-hypothesis-validation");
    }
}
