// src/agents/llm.rs — LLM-backed generator archetypes

use async_trait::async_trait;
use minijinja::{context, Environment};
use std::sync::Arc;

use super::parser::parse_hypotheses;
use super::GeneratorAgent;
use crate::core::types::{AgentSource, GenerationContext, Hypothesis};
use crate::evaluator::RefinementFeedback;
use crate::infra::errors::RaceError;
use crate::provider::{GenerationOptions, TextGenerator};

const FORMAT_RULES: &str = "\
Answer only with blocks in this exact format, one per hypothesis:
HYPOTHESIS: <short title>
STATEMENT: <one paragraph claim>
MECHANISM: <how it works physically or economically>
OUTCOME: <metric> = <number> <unit>
EVIDENCE: <supporting data or prior result>
VALIDATION: <concrete test step>
RISK: <main risk>
PARAM: <name> = <number>
Use PARAM for efficiency_mean, efficiency_std, cost_mean, cost_std, capacity_kw, \
capacity_factor, lifetime_years and target_lcoe where they apply.";

const GENERATE_TEMPLATE: &str = r#"## Problem
{{ problem }}
{% if research.summary %}
## Research
{{ research.summary }}
{% endif %}
{%- for f in research.key_findings %}
- {{ f }}
{%- endfor %}
{%- if research.constraints %}

## Constraints
{%- for c in research.constraints %}
- {{ c }}
{%- endfor %}
{%- endif %}

Propose {{ count }} distinct hypotheses.

{{ format_rules }}
"#;

const REFINE_TEMPLATE: &str = r#"## Problem
{{ problem }}

## Your hypothesis (version {{ h.version }})
HYPOTHESIS: {{ h.title }}
STATEMENT: {{ h.statement }}
{%- if h.mechanism %}
MECHANISM: {{ h.mechanism }}
{%- endif %}
{%- for o in h.predicted_outcomes %}
OUTCOME: {{ o.metric }} = {{ o.value }} {{ o.unit }}
{%- endfor %}
{%- for e in h.supporting_evidence %}
EVIDENCE: {{ e }}
{%- endfor %}
{%- for name, value in h.parameters|items %}
PARAM: {{ name }} = {{ value }}
{%- endfor %}

## Reviewer feedback
{{ feedback }}

Rewrite the hypothesis to close the gaps without losing its strengths.
Restate every OUTCOME and PARAM line you keep. Return exactly one block.

{{ format_rules }}
"#;

pub struct LlmGeneratorAgent {
    id: String,
    source: AgentSource,
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
    env: Environment<'static>,
}

impl LlmGeneratorAgent {
    pub fn new(
        source: AgentSource,
        generator: Arc<dyn TextGenerator>,
        model: &str,
        base_temperature: f32,
    ) -> Result<Self, RaceError> {
        let mut env = Environment::new();
        for (name, template) in [("generate", GENERATE_TEMPLATE), ("refine", REFINE_TEMPLATE)] {
            env.add_template(name, template)
                .map_err(|e| RaceError::Config(format!("{source} {name} template: {e}")))?;
        }

        let temperature = (base_temperature + source.temperature_offset()).clamp(0.0, 1.0);
        Ok(Self {
            id: format!("{source}-agent"),
            source,
            generator,
            options: GenerationOptions::new(model, temperature),
            env,
        })
    }

    pub fn temperature(&self) -> f32 {
        self.options.temperature
    }

    fn system_context(&self) -> String {
        format!(
            "You are a {} research strategist. {}",
            self.source.as_str().replace('_', "-"),
            self.source.brief()
        )
    }

    pub fn render_generate(&self, ctx: &GenerationContext) -> Result<String, RaceError> {
        self.env
            .get_template("generate")
            .and_then(|t| {
                t.render(context! {
                    problem => ctx.problem,
                    research => ctx.research,
                    count => ctx.hypotheses_per_agent,
                    format_rules => FORMAT_RULES,
                })
            })
            .map_err(|e| RaceError::Parse(format!("generate prompt: {e}")))
    }

    pub fn render_refine(
        &self,
        hypothesis: &Hypothesis,
        feedback: &RefinementFeedback,
        ctx: &GenerationContext,
    ) -> Result<String, RaceError> {
        self.env
            .get_template("refine")
            .and_then(|t| {
                t.render(context! {
                    problem => ctx.problem,
                    h => hypothesis,
                    feedback => feedback.render(),
                    format_rules => FORMAT_RULES,
                })
            })
            .map_err(|e| RaceError::Parse(format!("refine prompt: {e}")))
    }

    fn empty_response(&self) -> RaceError {
        RaceError::Agent {
            agent: self.id.clone(),
            message: "response contained no parseable HYPOTHESIS blocks".into(),
            retriable: true,
        }
    }
}

#[async_trait]
impl GeneratorAgent for LlmGeneratorAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn source(&self) -> AgentSource {
        self.source
    }

    async fn generate(&self, ctx: &GenerationContext) -> Result<Vec<Hypothesis>, RaceError> {
        let prompt = self.render_generate(ctx)?;
        let text = self
            .generator
            .generate_text(&self.system_context(), &prompt, &self.options)
            .await?;

        let mut hypotheses = parse_hypotheses(&text, &self.id, self.source);
        if hypotheses.is_empty() {
            return Err(self.empty_response());
        }
        hypotheses.truncate(ctx.hypotheses_per_agent.max(1));
        for h in &mut hypotheses {
            h.iteration = ctx.iteration;
        }
        tracing::debug!(agent = %self.id, count = hypotheses.len(), "Generated hypotheses");
        Ok(hypotheses)
    }

    async fn refine(
        &self,
        hypothesis: &Hypothesis,
        feedback: &RefinementFeedback,
        ctx: &GenerationContext,
    ) -> Result<Hypothesis, RaceError> {
        let prompt = self.render_refine(hypothesis, feedback, ctx)?;
        let text = self
            .generator
            .generate_text(&self.system_context(), &prompt, &self.options)
            .await?;

        let refined = parse_hypotheses(&text, &self.id, self.source)
            .into_iter()
            .next()
            .ok_or_else(|| self.empty_response())?;
        Ok(refined.as_refinement_of(hypothesis, ctx.iteration))
    }
}
