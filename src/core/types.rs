// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::gpu::GpuValidationResult;
use crate::score::{Classification, DimensionId, DimensionScore};

/// Generator archetypes. Each agent in the pool embodies one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSource {
    FirstPrinciples,
    CrossDomain,
    Contrarian,
    Incremental,
    Synthesis,
}

impl AgentSource {
    pub const ALL: [AgentSource; 5] = [
        AgentSource::FirstPrinciples,
        AgentSource::CrossDomain,
        AgentSource::Contrarian,
        AgentSource::Incremental,
        AgentSource::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentSource::FirstPrinciples => "first_principles",
            AgentSource::CrossDomain => "cross_domain",
            AgentSource::Contrarian => "contrarian",
            AgentSource::Incremental => "incremental",
            AgentSource::Synthesis => "synthesis",
        }
    }

    /// One-line brief handed to the generator prompt.
    pub fn brief(&self) -> &'static str {
        match self {
            AgentSource::FirstPrinciples => {
                "Reason from physical limits and conservation laws; ignore how things are done today."
            }
            AgentSource::CrossDomain => {
                "Transplant mechanisms from unrelated fields (biology, computing, finance) into this problem."
            }
            AgentSource::Contrarian => {
                "Attack the consensus assumption everyone else relies on and build on its failure."
            }
            AgentSource::Incremental => {
                "Find the highest-leverage improvement deployable with existing supply chains."
            }
            AgentSource::Synthesis => {
                "Combine two or more established findings into a mechanism neither achieves alone."
            }
        }
    }

    /// Added to the configured generator temperature.
    pub fn temperature_offset(&self) -> f32 {
        match self {
            AgentSource::FirstPrinciples => 0.0,
            AgentSource::CrossDomain => 0.1,
            AgentSource::Contrarian => 0.15,
            AgentSource::Incremental => -0.2,
            AgentSource::Synthesis => 0.05,
        }
    }
}

impl std::fmt::Display for AgentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    Active,
    Eliminated,
    Breakthrough,
    Promising,
    Winner,
}

impl std::fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HypothesisStatus::Active => "active",
            HypothesisStatus::Eliminated => "eliminated",
            HypothesisStatus::Breakthrough => "breakthrough",
            HypothesisStatus::Promising => "promising",
            HypothesisStatus::Winner => "winner",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedOutcome {
    pub metric: String,
    pub value: f64,
    pub unit: String,
}

/// Scores attached to a hypothesis by its latest evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisScores {
    /// `clamp(Σ dimension points + gpu_adjustment, 0, 10)`.
    pub overall: f64,
    pub dimensions: BTreeMap<DimensionId, DimensionScore>,
    pub gpu_adjustment: f64,
    pub classification: Classification,
    pub evaluated_iteration: u32,
}

impl HypothesisScores {
    pub fn dimension_points(&self) -> f64 {
        self.dimensions.values().map(|d| d.points).sum()
    }

    pub fn percentage(&self, dimension: DimensionId) -> Option<f64> {
        self.dimensions.get(&dimension).map(|d| d.percentage)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GpuValidationOutcome {
    Validated(GpuValidationResult),
    Unvalidated { reason: String },
}

/// A candidate solution produced by one generator agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub agent_id: String,
    pub agent_source: AgentSource,
    pub title: String,
    pub statement: String,
    pub mechanism: String,
    pub predicted_outcomes: Vec<PredictedOutcome>,
    pub supporting_evidence: Vec<String>,
    pub validation_plan: Vec<String>,
    pub risks: Vec<String>,
    /// Numeric simulation inputs (efficiency_mean, cost_mean, target_lcoe, ...).
    pub parameters: BTreeMap<String, f64>,
    pub iteration: u32,
    pub version: u32,
    pub parent_version: Option<u32>,
    pub status: HypothesisStatus,
    pub scores: Option<HypothesisScores>,
    pub gpu_validation: Option<GpuValidationOutcome>,
    pub eliminated_reason: Option<String>,
    pub refinement_suggestions: Vec<String>,
    /// Race-wide generation order, assigned by the arena.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hypothesis {
    pub fn new(
        agent_id: impl Into<String>,
        agent_source: AgentSource,
        title: impl Into<String>,
        statement: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            agent_source,
            title: title.into(),
            statement: statement.into(),
            mechanism: String::new(),
            predicted_outcomes: Vec::new(),
            supporting_evidence: Vec::new(),
            validation_plan: Vec::new(),
            risks: Vec::new(),
            parameters: BTreeMap::new(),
            iteration: 1,
            version: 1,
            parent_version: None,
            status: HypothesisStatus::Active,
            scores: None,
            gpu_validation: None,
            eliminated_reason: None,
            refinement_suggestions: Vec::new(),
            seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn overall_score(&self) -> f64 {
        self.scores.as_ref().map(|s| s.overall).unwrap_or(0.0)
    }

    pub fn classification(&self) -> Option<Classification> {
        self.scores.as_ref().map(|s| s.classification)
    }

    /// Whole text used by keyword-based scorers.
    pub fn full_text(&self) -> String {
        let mut text = String::with_capacity(self.statement.len() + self.mechanism.len() + 64);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.statement);
        text.push('\n');
        text.push_str(&self.mechanism);
        for line in self
            .supporting_evidence
            .iter()
            .chain(&self.validation_plan)
            .chain(&self.risks)
        {
            text.push('\n');
            text.push_str(line);
        }
        text
    }

    /// Promote a refinement to be the next version of `predecessor`,
    /// keeping identity, lineage, and race bookkeeping.
    pub fn as_refinement_of(mut self, predecessor: &Hypothesis, iteration: u32) -> Self {
        self.id = predecessor.id.clone();
        self.agent_id = predecessor.agent_id.clone();
        self.agent_source = predecessor.agent_source;
        self.seq = predecessor.seq;
        self.created_at = predecessor.created_at;
        self.updated_at = Utc::now();
        self.iteration = iteration;
        self.version = predecessor.version + 1;
        self.parent_version = Some(predecessor.version);
        self.status = HypothesisStatus::Active;
        // Scores stay on the predecessor's value until re-evaluated so the
        // evaluator can compute a delta.
        self.scores = predecessor.scores.clone();
        self.gpu_validation = None;
        self.eliminated_reason = None;
        self
    }
}

/// Background research handed to every generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchContext {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// What an agent sees when asked to generate or refine.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub race_id: String,
    pub research: ResearchContext,
    pub problem: String,
    pub iteration: u32,
    pub hypotheses_per_agent: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLifecycle {
    Idle,
    Generating,
    Refining,
    Completed,
    Failed,
}

/// Per-agent record, owned and mutated only by the agent pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub source: AgentSource,
    pub state: AgentLifecycle,
    pub hypotheses_generated: usize,
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentStatus {
    pub fn new(agent_id: impl Into<String>, source: AgentSource) -> Self {
        Self {
            agent_id: agent_id.into(),
            source,
            state: AgentLifecycle::Idle,
            hypotheses_generated: 0,
            errors: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    Idle,
    Generating,
    Evaluating,
    Refining,
    AwaitingExpertReview,
    Complete,
    Error,
}

impl std::fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RaceStatus::Idle => "idle",
            RaceStatus::Generating => "generating",
            RaceStatus::Evaluating => "evaluating",
            RaceStatus::Refining => "refining",
            RaceStatus::AwaitingExpertReview => "awaiting_expert_review",
            RaceStatus::Complete => "complete",
            RaceStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub hypothesis_id: String,
    pub title: String,
    pub agent_source: AgentSource,
    pub overall_score: f64,
    /// Change since the previous iteration's evaluation, if there was one.
    pub score_delta: Option<f64>,
    pub classification: Option<Classification>,
    pub status: HypothesisStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaceStatistics {
    pub total_generated: usize,
    pub total_eliminated: usize,
    pub total_breakthroughs: usize,
    pub refinements_accepted: usize,
    pub refinements_rejected: usize,
    pub gpu_validations: usize,
    pub gpu_cost_usd: f64,
    pub average_score: f64,
    pub best_score: f64,
}

/// Which partition a hypothesis belongs to after an elimination pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Active,
    Eliminated,
    BreakthroughCandidate,
}

/// Aggregate root for one race. Created fresh per race, never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceState {
    pub race_id: String,
    pub status: RaceStatus,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub hypotheses: HashMap<String, Hypothesis>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub active: BTreeSet<String>,
    pub eliminated: BTreeSet<String>,
    pub breakthrough_candidates: BTreeSet<String>,
    pub statistics: RaceStatistics,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RaceState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            race_id: uuid::Uuid::new_v4().to_string(),
            status: RaceStatus::Idle,
            current_iteration: 0,
            max_iterations,
            hypotheses: HashMap::new(),
            leaderboard: Vec::new(),
            active: BTreeSet::new(),
            eliminated: BTreeSet::new(),
            breakthrough_candidates: BTreeSet::new(),
            statistics: RaceStatistics::default(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Insert a freshly generated hypothesis into the active partition.
    pub fn insert_active(&mut self, mut hypothesis: Hypothesis) {
        hypothesis.status = HypothesisStatus::Active;
        self.active.insert(hypothesis.id.clone());
        self.hypotheses.insert(hypothesis.id.clone(), hypothesis);
    }

    /// Move a hypothesis into exactly one partition and sync its status.
    pub fn move_to(&mut self, id: &str, partition: Partition) {
        self.active.remove(id);
        self.eliminated.remove(id);
        self.breakthrough_candidates.remove(id);
        let status = match partition {
            Partition::Active => {
                self.active.insert(id.to_string());
                HypothesisStatus::Active
            }
            Partition::Eliminated => {
                self.eliminated.insert(id.to_string());
                HypothesisStatus::Eliminated
            }
            Partition::BreakthroughCandidate => {
                self.breakthrough_candidates.insert(id.to_string());
                HypothesisStatus::Breakthrough
            }
        };
        if let Some(h) = self.hypotheses.get_mut(id) {
            h.status = status;
            h.updated_at = Utc::now();
        }
    }

    pub fn active_hypotheses(&self) -> Vec<Hypothesis> {
        let mut out: Vec<Hypothesis> = self
            .active
            .iter()
            .filter_map(|id| self.hypotheses.get(id).cloned())
            .collect();
        out.sort_by_key(|h| h.seq);
        out
    }

    /// Every hypothesis sits in exactly one partition, and the partitions
    /// cover the table.
    pub fn partitions_consistent(&self) -> bool {
        let total = self.active.len() + self.eliminated.len() + self.breakthrough_candidates.len();
        if total != self.hypotheses.len() {
            return false;
        }
        self.hypotheses.keys().all(|id| {
            [
                self.active.contains(id),
                self.eliminated.contains(id),
                self.breakthrough_candidates.contains(id),
            ]
            .iter()
            .filter(|&&b| b)
            .count()
                == 1
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MaxIterations,
    NoActiveHypotheses,
    WinnersFound,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminationReason::MaxIterations => "max iterations reached",
            TerminationReason::NoActiveHypotheses => "no active hypotheses remain",
            TerminationReason::WinnersFound => "winners found",
        };
        write!(f, "{s}")
    }
}

/// Final result returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    pub race_id: String,
    pub winners: Vec<Hypothesis>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub iterations_completed: u32,
    pub termination: TerminationReason,
    pub statistics: RaceStatistics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Runtime configuration for one race.
#[derive(Debug, Clone)]
pub struct RaceConfig {
    pub max_iterations: u32,
    pub winners_count: usize,
    pub breakthrough_threshold: f64,
    pub refinement_rejection_margin: f64,
    pub expert_review: bool,
    pub expert_review_top_n: usize,
    pub hypotheses_per_agent: usize,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            winners_count: 3,
            breakthrough_threshold: crate::score::BREAKTHROUGH_THRESHOLD,
            refinement_rejection_margin: 0.5,
            expert_review: false,
            expert_review_top_n: 3,
            hypotheses_per_agent: 3,
        }
    }
}

impl From<&crate::infra::config::Config> for RaceConfig {
    fn from(cfg: &crate::infra::config::Config) -> Self {
        Self {
            max_iterations: cfg.race.max_iterations,
            winners_count: cfg.race.winners_count,
            breakthrough_threshold: cfg.race.breakthrough_threshold,
            refinement_rejection_margin: cfg.race.refinement_rejection_margin,
            expert_review: cfg.race.expert_review,
            expert_review_top_n: cfg.race.expert_review_top_n,
            hypotheses_per_agent: cfg.agents.hypotheses_per_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hyp(title: &str) -> Hypothesis {
        Hypothesis::new("agent-1", AgentSource::FirstPrinciples, title, "statement")
    }

    // ─── Hypothesis ─────────────────────────────────────────────

    #[test]
    fn test_hypothesis_new_defaults() {
        let h = hyp("Perovskite tandem");
        assert_eq!(h.status, HypothesisStatus::Active);
        assert_eq!(h.iteration, 1);
        assert_eq!(h.version, 1);
        assert!(h.scores.is_none());
        assert_eq!(h.overall_score(), 0.0);
        assert!(!h.id.is_empty());
    }

    #[test]
    fn test_hypothesis_unique_ids() {
        assert_ne!(hyp("a").id, hyp("b").id);
    }

    #[test]
    fn test_refinement_keeps_identity() {
        let mut original = hyp("v1");
        original.seq = 4;
        let refined = hyp("v2").as_refinement_of(&original, 3);
        assert_eq!(refined.id, original.id);
        assert_eq!(refined.seq, 4);
        assert_eq!(refined.version, 2);
        assert_eq!(refined.parent_version, Some(1));
        assert_eq!(refined.iteration, 3);
        assert_eq!(refined.title, "v2");
    }

    #[test]
    fn test_full_text_includes_structured_fields() {
        let mut h = hyp("Title");
        h.mechanism = "band gap tuning".into();
        h.supporting_evidence.push("NREL chart 2024".into());
        let text = h.full_text();
        assert!(text.contains("band gap tuning"));
        assert!(text.contains("NREL chart 2024"));
    }

    // ─── RaceState ──────────────────────────────────────────────

    #[test]
    fn test_partitions_stay_exclusive() {
        let mut state = RaceState::new(5);
        let a = hyp("a");
        let b = hyp("b");
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        state.insert_active(a);
        state.insert_active(b);
        assert!(state.partitions_consistent());

        state.move_to(&a_id, Partition::Eliminated);
        state.move_to(&b_id, Partition::BreakthroughCandidate);
        assert!(state.partitions_consistent());
        assert!(state.active.is_empty());
        assert_eq!(state.hypotheses[&a_id].status, HypothesisStatus::Eliminated);
        assert_eq!(state.hypotheses[&b_id].status, HypothesisStatus::Breakthrough);

        state.move_to(&a_id, Partition::Active);
        assert!(state.partitions_consistent());
        assert!(state.active.contains(&a_id));
        assert!(!state.eliminated.contains(&a_id));
    }

    #[test]
    fn test_active_hypotheses_in_generation_order() {
        let mut state = RaceState::new(3);
        for (i, title) in ["x", "y", "z"].iter().enumerate() {
            let mut h = hyp(title);
            h.seq = 10 - i as u64;
            state.insert_active(h);
        }
        let titles: Vec<_> = state
            .active_hypotheses()
            .into_iter()
            .map(|h| h.title)
            .collect();
        assert_eq!(titles, vec!["z", "y", "x"]);
    }

    #[test]
    fn test_race_config_from_config() {
        let mut cfg = crate::infra::config::Config::default();
        cfg.race.max_iterations = 7;
        cfg.agents.hypotheses_per_agent = 2;
        let rc = RaceConfig::from(&cfg);
        assert_eq!(rc.max_iterations, 7);
        assert_eq!(rc.hypotheses_per_agent, 2);
        assert_eq!(rc.winners_count, 3);
    }

    #[test]
    fn test_agent_source_serde_names() {
        let json = serde_json::to_string(&AgentSource::CrossDomain).unwrap();
        assert_eq!(json, "\"cross_domain\"");
        for s in AgentSource::ALL {
            assert_eq!(
                serde_json::to_string(&s).unwrap(),
                format!("\"{}\"", s.as_str())
            );
        }
    }
}
