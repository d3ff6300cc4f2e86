//! Pure fitness scoring
//!
//! Maps a strategy embedding plus market context to a scalar fitness and its
//! component breakdown. No I/O, no clocks, no randomness: the same inputs
//! always produce the same metrics, so coherence and publish decisions are
//! reproducible in tests.

use std::collections::BTreeMap;

use crate::config::NodeType;
use crate::domain::{FitnessMetrics, MarketConditions, NodeState, StrategyEmbedding};

/// Fitness scorer parameterised by node type.
#[derive(Debug, Clone)]
pub struct FitnessModel {
    node_type: NodeType,
}

impl FitnessModel {
    pub fn new(node_type: NodeType) -> Self {
        Self { node_type }
    }

    /// Score a strategy against the current market context and history.
    ///
    /// The score is the profile-weighted sum of squashed market signals,
    /// scaled by the embedding's activation, plus a momentum component from
    /// the two most recent snapshots. Clamped to [0, 1].
    pub fn score(
        &self,
        strategy: &StrategyEmbedding,
        market_conditions: &MarketConditions,
        history: &[NodeState],
    ) -> FitnessMetrics {
        let activation = squash(strategy.magnitude());
        let mut components = BTreeMap::new();
        let mut total = 0.0;

        for (name, weight) in self.node_type.fitness_profile() {
            let signal = market_conditions.get(name).copied().unwrap_or(0.0);
            let contribution = weight * squash(signal) * activation;
            components.insert(name.to_string(), contribution);
            total += contribution;
        }

        // Reward nodes whose fitness has been improving.
        let momentum = match history {
            [.., prev, last] => squash(last.fitness_score - prev.fitness_score) * 0.1,
            _ => 0.0,
        };
        components.insert("momentum".to_string(), momentum);
        total += momentum;

        FitnessMetrics {
            fitness_score: total.clamp(0.0, 1.0),
            components,
        }
    }
}

/// Monotonic squash of an unbounded signal into [0, 1) for x >= 0
/// (and (-1, 0] for negative x).
fn squash(x: f64) -> f64 {
    x / (1.0 + x.abs())
}
