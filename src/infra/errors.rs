// src/infra/errors.rs — Error types for the racing engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaceError {
    // External-call errors (retriable depending on kind)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Agent '{agent}' failed: {message}")]
    Agent {
        agent: String,
        message: String,
        retriable: bool,
    },

    // Race-level errors
    #[error("Race aborted")]
    Aborted,

    #[error("All {agents} generator agents failed to produce hypotheses")]
    AllAgentsFailed { agents: usize },

    #[error("Race instance has already been run; create a new arena")]
    RaceAlreadyRun,

    // GPU validation
    #[error("GPU tier {tier} has no free capacity")]
    GpuCapacity { tier: String },

    #[error("GPU validation failed: {0}")]
    Gpu(String),

    // Parsing / configuration
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RaceError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RaceError::Provider {
                retriable: true,
                ..
            } | RaceError::Agent {
                retriable: true,
                ..
            } | RaceError::RateLimited { .. }
                | RaceError::Timeout { .. }
        )
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RaceError::Aborted)
    }

    /// Server-suggested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            RaceError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
                Some(std::time::Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}
