//! External collaborator contracts
//!
//! The node only knows these input/output seams; generation, learning,
//! market validation, durable persistence, and out-of-band alerting live
//! behind them. Every call is made under the orchestrator's timeout and a
//! failure is recoverable by the cycle-error path.

use async_trait::async_trait;

use crate::domain::{
    FitnessMetrics, LearningDiagnostics, MarketConditions, NodeState, StrategyEmbedding,
};
use crate::error::Result;

/// Source of the market context fed to generation, validation, and scoring.
/// Live data acquisition lives behind this seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketContextSource: Send + Sync {
    async fn snapshot(&self) -> Result<MarketConditions>;
}

/// Perception collaborator: proposes candidate strategies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StrategyGenerator: Send + Sync {
    async fn generate(
        &self,
        market_context: &MarketConditions,
        fitness_metrics: &FitnessMetrics,
    ) -> Result<StrategyEmbedding>;
}

/// Cognition collaborator: folds an accepted candidate into the node's
/// learned strategy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LearningUpdater: Send + Sync {
    async fn update(
        &self,
        candidate: &StrategyEmbedding,
        history: &[NodeState],
    ) -> Result<(StrategyEmbedding, LearningDiagnostics)>;
}

/// Market validator verdict. Rejection is normal control flow, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject { reason: String },
}

/// Optional market-validation collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketValidator: Send + Sync {
    async fn validate(
        &self,
        strategy: &StrategyEmbedding,
        market_conditions: &MarketConditions,
    ) -> Result<Verdict>;
}

/// Durable sink for snapshots evicted from in-memory retention.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn persist(&self, snapshots: &[NodeState]) -> Result<()>;
}

/// Out-of-band alert channel, invoked only on fatal escalation and on
/// failed construction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn alert(&self, node_id: &str, message: &str) -> Result<()>;
}
