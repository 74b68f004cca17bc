// src/core/mod.rs — Race engine: state, events, and the racing arena

pub mod abort;
pub mod arena;
pub mod events;
pub mod review;
pub mod types;

pub use abort::{AbortHandle, AbortSignal};
pub use arena::{RacingArena, ORCHESTRATOR_ID};
pub use events::RaceEvent;
pub use review::{ExpertReview, ExpertReviewer, ReviewDecision};
