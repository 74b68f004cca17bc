// src/score/mod.rs — Score model: rubric, tiers, elimination rules
//
// Pure data and functions. Nothing in here performs I/O.

pub mod classification;
pub mod dimensions;
pub mod elimination;

use std::collections::BTreeMap;

pub use classification::{classify, required_dimensions_met, Classification};
pub use dimensions::{DimensionId, DimensionScore, ScoreLabel, DIMENSIONS};
pub use elimination::{EliminationPolicy, BREAKTHROUGH_THRESHOLD, MIN_ACTIVE_SURVIVORS};

pub const MAX_OVERALL: f64 = 10.0;

/// Sum of dimension points, clamped to [0, 10].
pub fn overall_from(dimensions: &BTreeMap<DimensionId, DimensionScore>) -> f64 {
    clamp_overall(dimensions.values().map(|d| d.points).sum())
}

pub fn clamp_overall(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, MAX_OVERALL)
}
