// src/score/dimensions.rs — The fixed scoring rubric

use serde::{Deserialize, Serialize};

/// Version tag of the rubric table below. Bump when dimensions or bands change.
pub const RUBRIC_VERSION: &str = "2026.1";

/// A dimension passes when it reaches this share of its maximum.
pub const PASS_PERCENT: f64 = 70.0;

/// Percentage reported by a scorer that found no usable signal. This is the
/// floor of the lowest non-zero band, so the dimension still earns points.
pub const NO_SIGNAL_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionId {
    PerformanceGains,
    CostReduction,
    AdvancedCapabilities,
    NewApplications,
    SocietalImpact,
    OpportunityScale,
    ProblemSolving,
    KnowledgeTrajectory,
    EvidenceQuality,
}

impl DimensionId {
    pub const ALL: [DimensionId; 9] = [
        DimensionId::PerformanceGains,
        DimensionId::CostReduction,
        DimensionId::AdvancedCapabilities,
        DimensionId::NewApplications,
        DimensionId::SocietalImpact,
        DimensionId::OpportunityScale,
        DimensionId::ProblemSolving,
        DimensionId::KnowledgeTrajectory,
        DimensionId::EvidenceQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionId::PerformanceGains => "performance_gains",
            DimensionId::CostReduction => "cost_reduction",
            DimensionId::AdvancedCapabilities => "advanced_capabilities",
            DimensionId::NewApplications => "new_applications",
            DimensionId::SocietalImpact => "societal_impact",
            DimensionId::OpportunityScale => "opportunity_scale",
            DimensionId::ProblemSolving => "problem_solving",
            DimensionId::KnowledgeTrajectory => "knowledge_trajectory",
            DimensionId::EvidenceQuality => "evidence_quality",
        }
    }

    /// Lenient parse used for judge output: accepts ids and display names.
    pub fn parse(s: &str) -> Option<DimensionId> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        DimensionId::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == normalized)
    }

    pub fn def(&self) -> &'static DimensionDef {
        // DIMENSIONS is declared in the same order as ALL.
        &DIMENSIONS[*self as usize]
    }
}

impl std::fmt::Display for DimensionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Percentage floor → fraction of the dimension's max points.
#[derive(Debug, Clone, Copy)]
pub struct ScoreBand {
    pub min_percent: f64,
    pub fraction: f64,
}

/// Bands shared by every dimension, highest first.
pub const STANDARD_BANDS: &[ScoreBand] = &[
    ScoreBand { min_percent: 95.0, fraction: 1.0 },
    ScoreBand { min_percent: 85.0, fraction: 0.9 },
    ScoreBand { min_percent: 70.0, fraction: 0.75 },
    ScoreBand { min_percent: 50.0, fraction: 0.5 },
    ScoreBand { min_percent: 30.0, fraction: 0.3 },
    ScoreBand { min_percent: NO_SIGNAL_PERCENT, fraction: 0.1 },
];

#[derive(Debug)]
pub struct DimensionDef {
    pub id: DimensionId,
    pub name: &'static str,
    pub description: &'static str,
    pub max_points: f64,
    /// Both required dimensions must pass for a breakthrough classification.
    pub required: bool,
    pub bands: &'static [ScoreBand],
}

impl DimensionDef {
    /// Convert a percentage to banded points. Never exceeds `max_points`.
    pub fn points_for(&self, percent: f64) -> f64 {
        let percent = clamp_percent(percent);
        let fraction = self
            .bands
            .iter()
            .find(|b| percent >= b.min_percent)
            .map(|b| b.fraction)
            .unwrap_or(0.0);
        (self.max_points * fraction).min(self.max_points)
    }

    pub fn passes(&self, percent: f64) -> bool {
        percent >= PASS_PERCENT
    }
}

pub static DIMENSIONS: [DimensionDef; 9] = [
    DimensionDef {
        id: DimensionId::PerformanceGains,
        name: "Performance Gains",
        description: "Quantified improvement in efficiency, output, or capability over the state of the art",
        max_points: 1.5,
        required: true,
        bands: STANDARD_BANDS,
    },
    DimensionDef {
        id: DimensionId::CostReduction,
        name: "Cost Reduction",
        description: "Credible reduction in capital, operating, or levelized cost",
        max_points: 1.5,
        required: true,
        bands: STANDARD_BANDS,
    },
    DimensionDef {
        id: DimensionId::AdvancedCapabilities,
        name: "Advanced Capabilities",
        description: "Enables something that current approaches cannot do at all",
        max_points: 1.0,
        required: false,
        bands: STANDARD_BANDS,
    },
    DimensionDef {
        id: DimensionId::NewApplications,
        name: "New Applications",
        description: "Opens markets or use cases beyond the original problem",
        max_points: 1.0,
        required: false,
        bands: STANDARD_BANDS,
    },
    DimensionDef {
        id: DimensionId::SocietalImpact,
        name: "Societal Impact",
        description: "Emissions, access, health, or equity effects at scale",
        max_points: 1.0,
        required: false,
        bands: STANDARD_BANDS,
    },
    DimensionDef {
        id: DimensionId::OpportunityScale,
        name: "Opportunity Scale",
        description: "Size of the addressable deployment or market",
        max_points: 1.0,
        required: false,
        bands: STANDARD_BANDS,
    },
    DimensionDef {
        id: DimensionId::ProblemSolving,
        name: "Problem Solving",
        description: "Directly resolves the stated bottleneck through an explicit mechanism",
        max_points: 1.0,
        required: false,
        bands: STANDARD_BANDS,
    },
    DimensionDef {
        id: DimensionId::KnowledgeTrajectory,
        name: "Knowledge Trajectory",
        description: "Builds on or redirects the current research trajectory",
        max_points: 1.0,
        required: false,
        bands: STANDARD_BANDS,
    },
    DimensionDef {
        id: DimensionId::EvidenceQuality,
        name: "Evidence Quality",
        description: "Grounding in literature, data, and a concrete validation plan",
        max_points: 1.0,
        required: false,
        bands: STANDARD_BANDS,
    },
];

pub fn required_dimensions() -> impl Iterator<Item = &'static DimensionDef> {
    DIMENSIONS.iter().filter(|d| d.required)
}

pub fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLabel {
    Excellent,
    Strong,
    Moderate,
    Weak,
    Minimal,
}

impl ScoreLabel {
    pub fn for_percent(percent: f64) -> Self {
        match clamp_percent(percent) {
            p if p >= 90.0 => ScoreLabel::Excellent,
            p if p >= 70.0 => ScoreLabel::Strong,
            p if p >= 50.0 => ScoreLabel::Moderate,
            p if p >= 30.0 => ScoreLabel::Weak,
            _ => ScoreLabel::Minimal,
        }
    }
}

impl std::fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScoreLabel::Excellent => "excellent",
            ScoreLabel::Strong => "strong",
            ScoreLabel::Moderate => "moderate",
            ScoreLabel::Weak => "weak",
            ScoreLabel::Minimal => "minimal",
        };
        write!(f, "{s}")
    }
}

/// Score of one hypothesis on one dimension for one iteration.
///
/// Produced by the evaluator and never mutated afterwards; the next
/// iteration's evaluation supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: DimensionId,
    /// 0-100.
    pub percentage: f64,
    pub points: f64,
    pub max_points: f64,
    pub evidence: Vec<String>,
    pub gaps: Vec<String>,
    pub label: ScoreLabel,
}

impl DimensionScore {
    pub fn new(
        dimension: DimensionId,
        percentage: f64,
        evidence: Vec<String>,
        gaps: Vec<String>,
    ) -> Self {
        let def = dimension.def();
        let percentage = clamp_percent(percentage);
        Self {
            dimension,
            percentage,
            points: def.points_for(percentage),
            max_points: def.max_points,
            evidence,
            gaps,
            label: ScoreLabel::for_percent(percentage),
        }
    }

    /// Score for a dimension whose scorer could not extract any signal.
    pub fn no_signal(dimension: DimensionId, gap: impl Into<String>) -> Self {
        Self::new(dimension, NO_SIGNAL_PERCENT, Vec::new(), vec![gap.into()])
    }

    pub fn passed(&self) -> bool {
        self.dimension.def().passes(self.percentage)
    }
}
