//! Core value types shared across the node
//!
//! Everything here is a value: created once, serialized as-is, never
//! mutated in place. Corrections are new values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Market context supplied to generation, validation, and scoring.
///
/// Keys are feature names ("volatility", "spread_bps", ...); the node treats
/// the mapping as opaque and only the fitness profile assigns meaning.
pub type MarketConditions = BTreeMap<String, f64>;

/// Opaque representation of a trading strategy.
///
/// Immutable once created; compared only through [`crate::fitness::FitnessModel`]
/// and the coherence computation. The `weights` vector is the numeric
/// representation used for cosine-style similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEmbedding {
    /// Stable identity of this embedding
    pub id: Uuid,
    /// Which generation of the node's evolution produced it
    pub generation: u64,
    /// Numeric representation (direction is what coherence compares)
    pub weights: Vec<f64>,
}

impl StrategyEmbedding {
    /// Create a new embedding for the given generation.
    pub fn new(generation: u64, weights: Vec<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            weights,
        }
    }

    /// Euclidean magnitude of the weight vector.
    pub fn magnitude(&self) -> f64 {
        self.weights.iter().map(|w| w * w).sum::<f64>().sqrt()
    }

    /// Dimensionality of the numeric representation.
    pub fn dimensions(&self) -> usize {
        self.weights.len()
    }
}

/// Scalar fitness plus the per-component breakdown that produced it.
///
/// Derived data: recomputed whenever market context changes, never persisted
/// without the embedding that generated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessMetrics {
    pub fitness_score: f64,
    /// Component name -> contribution. BTreeMap keeps iteration deterministic.
    pub components: BTreeMap<String, f64>,
}

impl FitnessMetrics {
    /// Neutral metrics used before the node has scored anything.
    pub fn neutral() -> Self {
        Self {
            fitness_score: 0.0,
            components: BTreeMap::new(),
        }
    }
}

/// Immutable node state snapshot, one per completed cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub timestamp: DateTime<Utc>,
    pub fitness_score: f64,
    pub strategy_embedding: StrategyEmbedding,
    pub market_conditions: MarketConditions,
    /// Fitness-weighted similarity to the peer fleet, in [0, 1]
    pub network_coherence: f64,
    /// Approximate in-memory footprint of the palace at snapshot time
    pub memory_usage_mb: f64,
    /// Set when the validation gate was disabled for this cycle
    pub unvalidated: bool,
    /// Set when the cycle ran against a cached (stale) peer snapshot
    pub stale_sync: bool,
}

/// Per-node published record in the shared state store.
///
/// Exactly one record per `node_id`; owned by that node. Peers read all
/// records but write only their own, guarded by `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub node_id: String,
    pub strategy_embedding: StrategyEmbedding,
    pub fitness_score: f64,
    pub published_at: DateTime<Utc>,
    /// Monotonic counter for optimistic-concurrency writes
    pub version: u64,
}

impl NetworkRecord {
    /// First published record for a node (version 1).
    pub fn initial(node_id: &str, embedding: StrategyEmbedding, fitness_score: f64) -> Self {
        Self {
            node_id: node_id.to_string(),
            strategy_embedding: embedding,
            fitness_score,
            published_at: Utc::now(),
            version: 1,
        }
    }

    /// Successor record carrying the next version number.
    pub fn next(&self, embedding: StrategyEmbedding, fitness_score: f64) -> Self {
        Self {
            node_id: self.node_id.clone(),
            strategy_embedding: embedding,
            fitness_score,
            published_at: Utc::now(),
            version: self.version + 1,
        }
    }
}

/// Diagnostics returned by the learning updater alongside the folded strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningDiagnostics {
    pub loss: f64,
    pub exploration_rate: f64,
    pub updates_applied: u64,
}
