// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::types::AgentSource;
use crate::evaluator::cache::StructuredFieldPolicy;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub race: RaceSection,

    #[serde(default)]
    pub agents: AgentsSection,

    #[serde(default)]
    pub bus: BusSection,

    #[serde(default)]
    pub evaluator: EvaluatorSection,

    #[serde(default)]
    pub gpu: GpuSection,

    #[serde(default)]
    pub models: ModelsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceSection {
    pub max_iterations: u32,
    pub winners_count: usize,
    pub breakthrough_threshold: f64,
    /// A refinement scoring more than this below its predecessor is rejected.
    pub refinement_rejection_margin: f64,
    pub expert_review: bool,
    pub expert_review_top_n: usize,
}

impl Default for RaceSection {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            winners_count: 3,
            breakthrough_threshold: 9.0,
            refinement_rejection_margin: 0.5,
            expert_review: false,
            expert_review_top_n: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsSection {
    pub enabled: Vec<AgentSource>,
    pub hypotheses_per_agent: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_seconds: u64,
    pub min_total_hypotheses: usize,
    pub max_concurrency: usize,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            enabled: AgentSource::ALL.to_vec(),
            hypotheses_per_agent: 3,
            max_attempts: 3,
            base_delay_ms: 1_000,
            timeout_seconds: 120,
            min_total_hypotheses: 3,
            max_concurrency: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSection {
    pub queue_capacity: usize,
    pub dispatch_interval_ms: u64,
    pub batch_size: usize,
    pub history_size: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            queue_capacity: 1_000,
            dispatch_interval_ms: 50,
            batch_size: 10,
            history_size: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSection {
    pub max_concurrency: usize,
    pub use_judge: bool,
    pub structured_fields: StructuredFieldPolicy,
    pub judge_max_attempts: u32,
    pub judge_timeout_seconds: u64,
}

impl Default for EvaluatorSection {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            use_judge: true,
            structured_fields: StructuredFieldPolicy::Recompute,
            judge_max_attempts: 3,
            judge_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSection {
    pub enabled: bool,
    /// Base URL of the validation service (POST {endpoint}/batch-hypothesis-validation).
    pub endpoint: Option<String>,
    pub start_iteration: u32,
    pub score_threshold: f64,
    pub max_adjustment: f64,
    pub cache_ttl_seconds: u64,
    pub request_timeout_seconds: u64,
    pub capacity: TierCapacity,
}

impl Default for GpuSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            start_iteration: 2,
            score_threshold: 7.0,
            max_adjustment: 0.5,
            cache_ttl_seconds: 3_600,
            request_timeout_seconds: 600,
            capacity: TierCapacity::default(),
        }
    }
}

/// Concurrent validation jobs per GPU tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCapacity {
    pub t4: usize,
    pub a10g: usize,
    pub a100: usize,
}

impl Default for TierCapacity {
    fn default() -> Self {
        Self {
            t4: 10,
            a10g: 4,
            a100: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsSection {
    pub generator: String,
    pub judge: String,
    pub generator_temperature: f32,
    pub judge_temperature: f32,
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            generator: "claude-sonnet-4-20250514".into(),
            judge: "claude-sonnet-4-20250514".into(),
            generator_temperature: 0.8,
            judge_temperature: 0.1,
        }
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        match paths::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.race.max_iterations == 0 {
            anyhow::bail!("race.max_iterations must be at least 1");
        }
        if self.race.winners_count == 0 {
            anyhow::bail!("race.winners_count must be at least 1");
        }
        if self.agents.max_attempts == 0 {
            anyhow::bail!("agents.max_attempts must be at least 1");
        }
        if self.agents.enabled.is_empty() {
            anyhow::bail!("agents.enabled must name at least one generator archetype");
        }
        if self.bus.queue_capacity == 0 || self.bus.batch_size == 0 {
            anyhow::bail!("bus.queue_capacity and bus.batch_size must be positive");
        }
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
