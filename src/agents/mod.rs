// src/agents/mod.rs — Generator agents and the pool that runs them

pub mod llm;
pub mod parser;
pub mod pool;

use async_trait::async_trait;

use crate::core::types::{AgentSource, GenerationContext, Hypothesis};
use crate::evaluator::RefinementFeedback;
use crate::infra::errors::RaceError;

pub use llm::LlmGeneratorAgent;
pub use pool::{AgentPool, AgentRunResult, GenerationBatch, PoolConfig};

/// One independent hypothesis generator. Agents only return data; the
/// arena owns race state.
#[async_trait]
pub trait GeneratorAgent: Send + Sync {
    fn id(&self) -> &str;

    fn source(&self) -> AgentSource;

    async fn generate(&self, ctx: &GenerationContext) -> Result<Vec<Hypothesis>, RaceError>;

    /// Produce the next version of one of this agent's hypotheses.
    async fn refine(
        &self,
        hypothesis: &Hypothesis,
        feedback: &RefinementFeedback,
        ctx: &GenerationContext,
    ) -> Result<Hypothesis, RaceError>;
}
