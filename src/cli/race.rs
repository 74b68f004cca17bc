// src/cli/race.rs — `race` command: wire the arena from config and run it

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::progress::{format_result, terminal_progress};
use super::RaceArgs;
use crate::agents::{AgentPool, GeneratorAgent, LlmGeneratorAgent, PoolConfig};
use crate::bus::{BusConfig, FeedbackBus};
use crate::core::arena::RacingArena;
use crate::core::types::{RaceConfig, ResearchContext};
use crate::evaluator::judge::LlmJudge;
use crate::evaluator::{BreakthroughEvaluator, EvaluatorConfig};
use crate::gpu::modal::HttpValidationBackend;
use crate::gpu::{BridgeConfig, GpuValidationBridge, TieredGpuPool};
use crate::infra::config::Config;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::{GenerationOptions, TextGenerator};

pub async fn run_race(args: &RaceArgs, config: &Config) -> anyhow::Result<()> {
    let provider: Arc<dyn TextGenerator> = match AnthropicProvider::from_env() {
        Some(p) => Arc::new(p),
        None => anyhow::bail!("ANTHROPIC_API_KEY is not set"),
    };

    let research = match &args.research {
        Some(path) => load_research(path)?,
        None => ResearchContext::default(),
    };

    let arena = build_arena(args, config, provider)?;
    let arena = if args.quiet {
        arena
    } else {
        arena.on_event(terminal_progress())
    };

    let abort = arena.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, aborting race");
            abort.abort();
        }
    });

    let result = arena.run_race(research, &args.problem).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", format_result(&result));
    }
    Ok(())
}

/// Assemble agents, evaluator, bus, and optional GPU bridge from config.
pub fn build_arena(
    args: &RaceArgs,
    config: &Config,
    provider: Arc<dyn TextGenerator>,
) -> anyhow::Result<RacingArena> {
    let agents = config
        .agents
        .enabled
        .iter()
        .map(|source| {
            LlmGeneratorAgent::new(
                *source,
                Arc::clone(&provider),
                &config.models.generator,
                config.models.generator_temperature,
            )
            .map(|a| Arc::new(a) as Arc<dyn GeneratorAgent>)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let pool = AgentPool::new(agents, PoolConfig::from(config));

    let mut evaluator = BreakthroughEvaluator::new(EvaluatorConfig::from(config));
    if config.evaluator.use_judge {
        let judge = LlmJudge::new(
            Arc::clone(&provider),
            GenerationOptions::new(&config.models.judge, config.models.judge_temperature),
        )?;
        evaluator = evaluator.with_judge(Arc::new(judge));
    }

    let bus = FeedbackBus::new(BusConfig::from(&config.bus));

    let mut race_config = RaceConfig::from(config);
    if let Some(n) = args.iterations {
        race_config.max_iterations = n.max(1);
    }
    if let Some(n) = args.winners {
        race_config.winners_count = n.max(1);
    }

    let mut arena = RacingArena::new(pool, evaluator, bus, race_config);

    if config.gpu.enabled {
        match &config.gpu.endpoint {
            Some(endpoint) => {
                let backend = HttpValidationBackend::new(
                    endpoint.as_str(),
                    Duration::from_secs(config.gpu.request_timeout_seconds),
                );
                let gpu_pool = TieredGpuPool::from_config(Arc::new(backend), &config.gpu);
                arena = arena.with_gpu(GpuValidationBridge::new(
                    Arc::new(gpu_pool),
                    BridgeConfig::from(&config.gpu),
                ));
            }
            None => tracing::warn!("gpu.enabled is set but gpu.endpoint is missing, GPU validation off"),
        }
    }

    Ok(arena)
}

fn load_research(path: &Path) -> anyhow::Result<ResearchContext> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read research file {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}
