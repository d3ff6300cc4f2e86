//! Evolutionary-cycle state machine
//!
//! INIT → SYNCING → GENERATING → VALIDATING → LEARNING → PUBLISHING → IDLE
//!   → SYNCING → ...
//!
//! ERROR is reachable from any phase; SHUTDOWN is terminal and reachable
//! only from IDLE or ERROR.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AenError, Result};

/// Phase of the evolutionary cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    /// Constructed, not yet synchronized
    Init,
    /// Pulling peer records from the shared state store
    Syncing,
    /// Requesting a candidate from the strategy generator
    Generating,
    /// Candidate at the validation gate
    Validating,
    /// Folding the accepted candidate via the learning updater
    Learning,
    /// Recording the snapshot and publishing the network record
    Publishing,
    /// Sleeping until the next cycle floor
    Idle,
    /// A cycle failed; the node will attempt to resume at SYNCING
    Error,
    /// Terminal
    Shutdown,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CyclePhase::Init => "INIT",
            CyclePhase::Syncing => "SYNCING",
            CyclePhase::Generating => "GENERATING",
            CyclePhase::Validating => "VALIDATING",
            CyclePhase::Learning => "LEARNING",
            CyclePhase::Publishing => "PUBLISHING",
            CyclePhase::Idle => "IDLE",
            CyclePhase::Error => "ERROR",
            CyclePhase::Shutdown => "SHUTDOWN",
        };
        write!(f, "{s}")
    }
}

impl CyclePhase {
    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(&self, to: CyclePhase) -> bool {
        use CyclePhase::*;
        // Any non-terminal phase may fail into ERROR.
        if to == Error {
            return *self != Shutdown;
        }
        matches!(
            (*self, to),
            (Init, Syncing)
                | (Syncing, Generating)
                // Early cycle end (rejection) still runs the closing sync
                | (Validating, Idle)
                | (Generating, Validating)
                | (Validating, Learning)
                | (Learning, Publishing)
                | (Publishing, Idle)
                | (Idle, Syncing)
                | (Error, Syncing)
                | (Idle, Shutdown)
                | (Error, Shutdown)
        )
    }
}

/// Tracks the current phase and enforces transition legality.
#[derive(Debug)]
pub struct PhaseTracker {
    current: CyclePhase,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: CyclePhase::Init,
        }
    }

    pub fn current(&self) -> CyclePhase {
        self.current
    }

    /// Move to `to`, failing on an illegal transition.
    pub fn transition(&mut self, to: CyclePhase) -> Result<()> {
        if !self.current.can_transition_to(to) {
            return Err(AenError::InvalidPhaseTransition {
                from: self.current.to_string(),
                to: to.to_string(),
            });
        }
        tracing::trace!(from = %self.current, to = %to, "phase transition");
        self.current = to;
        Ok(())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
