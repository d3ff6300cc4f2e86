//! Node orchestration: the cycle state machine and its driver.

mod orchestrator;
mod phase;

pub use orchestrator::{Collaborators, CycleOutcome, NodeOrchestrator};
pub use phase::{CyclePhase, PhaseTracker};
