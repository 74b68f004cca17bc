// src/cli/mod.rs — CLI definition (clap derive)

pub mod progress;
pub mod race;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "breakthrough",
    about = "Race competing research hypotheses to a breakthrough",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one hypothesis race
    Race(RaceArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct RaceArgs {
    /// Problem statement the agents race on
    #[arg(long)]
    pub problem: String,

    /// JSON file with background research (domain, summary, key_findings, ...)
    #[arg(long)]
    pub research: Option<PathBuf>,

    /// Override race.max_iterations
    #[arg(short, long)]
    pub iterations: Option<u32>,

    /// Override race.winners_count
    #[arg(short, long)]
    pub winners: Option<usize>,

    /// Suppress progress output (only emit final result)
    #[arg(long)]
    pub quiet: bool,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}
