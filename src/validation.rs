//! Validation gate
//!
//! Boundary between strategy generation and node state: a candidate only
//! becomes part of a snapshot after passing this gate. When market
//! validation is disabled the gate accepts unconditionally, but the
//! resulting snapshots are flagged `unvalidated` so coherence consumers can
//! discount them.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::collaborators::{MarketValidator, Verdict};
use crate::domain::{MarketConditions, StrategyEmbedding};
use crate::error::Result;

/// Gate decision, including whether a real validator was consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Accepted,
    /// Accepted without consulting a validator (validation disabled)
    AcceptedUnvalidated,
    Rejected { reason: String },
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, GateDecision::Rejected { .. })
    }

    /// Whether the resulting snapshot must carry the `unvalidated` flag.
    pub fn unvalidated(&self) -> bool {
        matches!(self, GateDecision::AcceptedUnvalidated)
    }
}

pub struct ValidationGate {
    validator: Option<Arc<dyn MarketValidator>>,
}

impl ValidationGate {
    /// Gate delegating to a market validator.
    pub fn enabled(validator: Arc<dyn MarketValidator>) -> Self {
        Self {
            validator: Some(validator),
        }
    }

    /// Gate that accepts unconditionally (simulation mode).
    pub fn disabled() -> Self {
        Self { validator: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.validator.is_some()
    }

    /// Decide whether a candidate may affect node state.
    pub async fn check(
        &self,
        strategy: &StrategyEmbedding,
        market_conditions: &MarketConditions,
    ) -> Result<GateDecision> {
        let Some(validator) = &self.validator else {
            debug!("market validation disabled, accepting unvalidated");
            return Ok(GateDecision::AcceptedUnvalidated);
        };

        match validator.validate(strategy, market_conditions).await? {
            Verdict::Accept => Ok(GateDecision::Accepted),
            Verdict::Reject { reason } => {
                warn!(%reason, "candidate rejected by market validator");
                Ok(GateDecision::Rejected { reason })
            }
        }
    }
}
