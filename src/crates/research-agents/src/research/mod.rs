//! Research Orchestrator, the hard core of this engine.

pub mod orchestrator;
pub mod strategy;

pub use orchestrator::{run, Outcome, ResearchMetrics};
