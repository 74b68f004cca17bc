// src/evaluator/judge.rs — LLM dimension judge

use async_trait::async_trait;
use minijinja::{context, Environment};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::parser::parse_judge_response;
use crate::core::types::Hypothesis;
use crate::infra::errors::RaceError;
use crate::provider::{GenerationOptions, TextGenerator};
use crate::score::{DimensionId, DimensionScore, DIMENSIONS};

/// Scores a hypothesis on every dimension using an external judgment.
#[async_trait]
pub trait DimensionJudge: Send + Sync {
    /// Must return one score per dimension, or an error so the caller can
    /// fall back to deterministic scoring.
    async fn judge(
        &self,
        hypothesis: &Hypothesis,
        problem: &str,
    ) -> Result<BTreeMap<DimensionId, DimensionScore>, RaceError>;
}

const JUDGE_CONTEXT: &str = "You are a rigorous scientific reviewer scoring research \
hypotheses against a fixed rubric. Be skeptical: unquantified claims score low.";

const JUDGE_TEMPLATE: &str = r#"## Problem
{{ problem }}

## Hypothesis: {{ h.title }}
{{ h.statement }}
{% if h.mechanism %}
Mechanism: {{ h.mechanism }}
{% endif %}
{%- for o in h.predicted_outcomes %}
Predicted: {{ o.metric }} = {{ o.value }} {{ o.unit }}
{%- endfor %}
{%- for e in h.supporting_evidence %}
Evidence: {{ e }}
{%- endfor %}
{%- for v in h.validation_plan %}
Validation: {{ v }}
{%- endfor %}
{%- for r in h.risks %}
Risk: {{ r }}
{%- endfor %}

## Rubric
{%- for d in dimensions %}
- {{ d.id }} ({{ d.name }}{% if d.required %}, required{% endif %}): {{ d.description }}
{%- endfor %}

Score every dimension from 0 to 100. Respond in exactly this format:
SCORES:
dimension_id: percent
EVIDENCE:
dimension_id: what supports the score
GAPS:
dimension_id: what is missing
"#;

pub struct LlmJudge {
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
    env: Environment<'static>,
}

impl LlmJudge {
    pub fn new(generator: Arc<dyn TextGenerator>, options: GenerationOptions) -> Result<Self, RaceError> {
        let mut env = Environment::new();
        env.add_template("judge", JUDGE_TEMPLATE)
            .map_err(|e| RaceError::Config(format!("judge template: {e}")))?;
        Ok(Self {
            generator,
            options,
            env,
        })
    }

    pub fn render_prompt(&self, hypothesis: &Hypothesis, problem: &str) -> Result<String, RaceError> {
        let dimensions: Vec<_> = DIMENSIONS
            .iter()
            .map(|d| {
                context! {
                    id => d.id.as_str(),
                    name => d.name,
                    description => d.description,
                    required => d.required,
                }
            })
            .collect();
        self.env
            .get_template("judge")
            .and_then(|t| t.render(context! { problem, h => hypothesis, dimensions }))
            .map_err(|e| RaceError::Parse(format!("judge prompt: {e}")))
    }
}

#[async_trait]
impl DimensionJudge for LlmJudge {
    async fn judge(
        &self,
        hypothesis: &Hypothesis,
        problem: &str,
    ) -> Result<BTreeMap<DimensionId, DimensionScore>, RaceError> {
        let prompt = self.render_prompt(hypothesis, problem)?;
        let response = self
            .generator
            .generate_text(JUDGE_CONTEXT, &prompt, &self.options)
            .await?;

        let parsed = parse_judge_response(&response);
        if parsed.percentages.is_empty() {
            return Err(RaceError::Parse(
                "judge response has no SCORES section".into(),
            ));
        }
        Ok(parsed.into_scores())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AgentSource, PredictedOutcome};
    use crate::score::dimensions::NO_SIGNAL_PERCENT;

    struct CannedGenerator(String);

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        fn id(&self) -> &str {
            "canned"
        }

        async fn generate_text(
            &self,
            _context: &str,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, RaceError> {
            Ok(self.0.clone())
        }
    }

    fn judge(response: &str) -> LlmJudge {
        LlmJudge::new(
            Arc::new(CannedGenerator(response.into())),
            GenerationOptions::new("judge-model", 0.1),
        )
        .unwrap()
    }

    fn hypothesis() -> Hypothesis {
        let mut h = Hypothesis::new(
            "a",
            AgentSource::Contrarian,
            "Drop the inverter",
            "Run DC loads directly from panels",
        );
        h.mechanism = "Eliminates conversion loss".into();
        h.predicted_outcomes.push(PredictedOutcome {
            metric: "system efficiency".into(),
            value: 12.0,
            unit: "%".into(),
        });
        h
    }

    #[test]
    fn test_prompt_contains_hypothesis_and_rubric() {
        let prompt = judge("").render_prompt(&hypothesis(), "Cut solar BOS cost").unwrap();
        assert!(prompt.contains("Cut solar BOS cost"));
        assert!(prompt.contains("Drop the inverter"));
        assert!(prompt.contains("Mechanism: Eliminates conversion loss"));
        assert!(prompt.contains("Predicted: system efficiency = 12"));
        assert!(prompt.contains("performance_gains (Performance Gains, required)"));
        assert!(prompt.contains("evidence_quality"));
    }

    #[tokio::test]
    async fn test_judge_fills_missing_dimensions() {
        let scores = judge("SCORES:\nperformance_gains: 88\ncost_reduction: 91")
            .judge(&hypothesis(), "p")
            .await
            .unwrap();
        assert_eq!(scores.len(), 9);
        assert_eq!(scores[&DimensionId::CostReduction].percentage, 91.0);
        assert_eq!(
            scores[&DimensionId::SocietalImpact].percentage,
            NO_SIGNAL_PERCENT
        );
    }

    #[tokio::test]
    async fn test_judge_without_scores_is_an_error() {
        let result = judge("Sorry, I can't help with that.")
            .judge(&hypothesis(), "p")
            .await;
        assert!(matches!(result, Err(RaceError::Parse(_))));
    }
}
