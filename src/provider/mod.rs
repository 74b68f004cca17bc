// src/provider/mod.rs — Text generation / judgment service seam

pub mod anthropic;
pub mod retry;

use async_trait::async_trait;

use crate::infra::errors::RaceError;

pub use retry::{retry_with_timeout, RetryPolicy};

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationOptions {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens: 4096,
        }
    }
}

/// Opaque text-generation service used by generator agents and the judge.
///
/// `context` is the standing instruction (system prompt), `prompt` the
/// request itself. Errors should be classified so `is_retriable()` is
/// meaningful to the retry combinator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn id(&self) -> &str;

    async fn generate_text(
        &self,
        context: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, RaceError>;
}
