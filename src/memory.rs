//! Memory palace
//!
//! Node-local append-only history of state snapshots plus the network
//! coherence computation. `record` is deterministic with respect to the peer
//! snapshot it is given: a snapshot's coherence is computed only from the
//! records visible when it was produced and is never recomputed.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::domain::{
    FitnessMetrics, MarketConditions, NetworkRecord, NodeState, StrategyEmbedding,
};

/// Inputs describing how the cycle that produced a snapshot ran.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleFlags {
    /// Validation gate was disabled for this cycle
    pub unvalidated: bool,
    /// Peer snapshot came from cache after a failed sync
    pub stale_sync: bool,
}

/// Append-only snapshot history for one node.
pub struct MemoryPalace {
    node_id: String,
    history: VecDeque<NodeState>,
    /// In-memory retention cap; evicted entries wait in `overflow` for the
    /// persistence sink
    max_entries: usize,
    overflow: Vec<NodeState>,
    total_recorded: u64,
}

impl MemoryPalace {
    pub fn new(node_id: &str, max_entries: usize) -> Self {
        Self {
            node_id: node_id.to_string(),
            history: VecDeque::new(),
            max_entries,
            overflow: Vec::new(),
            total_recorded: 0,
        }
    }

    /// Produce and append the snapshot for a completed cycle.
    ///
    /// Pure with respect to `peers`: the same strategy, metrics, context and
    /// peer records always yield the same coherence.
    pub fn record(
        &mut self,
        strategy: StrategyEmbedding,
        metrics: &FitnessMetrics,
        market_conditions: MarketConditions,
        peers: &HashMap<String, NetworkRecord>,
        flags: CycleFlags,
    ) -> NodeState {
        let coherence = network_coherence(&self.node_id, &strategy, peers);

        let state = NodeState {
            timestamp: Utc::now(),
            fitness_score: metrics.fitness_score,
            strategy_embedding: strategy,
            market_conditions,
            network_coherence: coherence,
            memory_usage_mb: self.approximate_usage_mb(),
            unvalidated: flags.unvalidated,
            stale_sync: flags.stale_sync,
        };

        self.history.push_back(state.clone());
        self.total_recorded += 1;

        while self.history.len() > self.max_entries {
            if let Some(evicted) = self.history.pop_front() {
                self.overflow.push(evicted);
            }
        }

        debug!(
            node_id = %self.node_id,
            coherence,
            fitness = metrics.fitness_score,
            history_len = self.history.len(),
            "snapshot recorded"
        );

        state
    }

    /// The `n` most recent snapshots, oldest first.
    pub fn recent(&self, n: usize) -> Vec<NodeState> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Snapshots at or after `timestamp`, oldest first.
    pub fn since(&self, timestamp: DateTime<Utc>) -> Vec<NodeState> {
        self.history
            .iter()
            .filter(|s| s.timestamp >= timestamp)
            .cloned()
            .collect()
    }

    /// Latest snapshot, if any cycle has completed.
    pub fn latest(&self) -> Option<&NodeState> {
        self.history.back()
    }

    /// Snapshots evicted by the retention cap, handed off for durable
    /// persistence. Draining transfers ownership; the palace forgets them.
    pub fn drain_overflow(&mut self) -> Vec<NodeState> {
        std::mem::take(&mut self.overflow)
    }

    /// Count of snapshots ever recorded, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Rough in-memory footprint of the retained history.
    fn approximate_usage_mb(&self) -> f64 {
        let bytes: usize = self
            .history
            .iter()
            .map(|s| {
                std::mem::size_of::<NodeState>()
                    + s.strategy_embedding.weights.len() * std::mem::size_of::<f64>()
                    + s.market_conditions.len() * 48
            })
            .sum();
        bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Fitness-weighted similarity of a node's strategy to its peer fleet.
///
/// Peers are weighted by published fitness (clamped at zero) normalized to
/// sum to 1; nodes absent from the snapshot contribute nothing. The result
/// is cosine similarity against the weighted centroid, clamped to [0, 1].
///
/// Degenerate cases: no peers, or all peer weights zero, yield 1.0 (there is
/// no fleet signal to diverge from); a zero-magnitude strategy or centroid
/// yields 0.0.
pub fn network_coherence(
    node_id: &str,
    strategy: &StrategyEmbedding,
    peers: &HashMap<String, NetworkRecord>,
) -> f64 {
    let peer_records: Vec<&NetworkRecord> =
        peers.values().filter(|r| r.node_id != node_id).collect();
    if peer_records.is_empty() {
        return 1.0;
    }

    let total_weight: f64 = peer_records.iter().map(|r| r.fitness_score.max(0.0)).sum();
    if total_weight <= 0.0 {
        return 1.0;
    }

    let dims = peer_records
        .iter()
        .map(|r| r.strategy_embedding.weights.len())
        .chain(std::iter::once(strategy.weights.len()))
        .max()
        .unwrap_or(0);

    let mut centroid = vec![0.0; dims];
    for record in &peer_records {
        let weight = record.fitness_score.max(0.0) / total_weight;
        for (i, w) in record.strategy_embedding.weights.iter().enumerate() {
            centroid[i] += weight * w;
        }
    }

    cosine_similarity(&strategy.weights, &centroid).clamp(0.0, 1.0)
}

/// Cosine similarity over possibly mismatched dimensions (missing entries
/// are treated as zero). Zero-magnitude inputs yield 0.0.
fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(node_id: &str, weights: Vec<f64>, fitness: f64) -> (String, NetworkRecord) {
        (
            node_id.to_string(),
            NetworkRecord::initial(node_id, StrategyEmbedding::new(0, weights), fitness),
        )
    }

    fn metrics(score: f64) -> FitnessMetrics {
        FitnessMetrics {
            fitness_score: score,
            components: Default::default(),
        }
    }

    #[test]
    fn coherence_is_one_for_identical_direction() {
        let peers: HashMap<_, _> = [
            peer("peer-a", vec![2.0, 0.0], 0.8),
            peer("peer-b", vec![4.0, 0.0], 0.4),
        ]
        .into_iter()
        .collect();

        // Same direction as the centroid, different magnitude.
        let strategy = StrategyEmbedding::new(0, vec![7.0, 0.0]);
        let coherence = network_coherence("node-self", &strategy, &peers);
        assert!((coherence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coherence_is_zero_for_orthogonal_strategy() {
        let peers: HashMap<_, _> = [peer("peer-a", vec![1.0, 0.0], 0.5)].into_iter().collect();
        let strategy = StrategyEmbedding::new(0, vec![0.0, 1.0]);
        assert_eq!(network_coherence("node-self", &strategy, &peers), 0.0);
    }

    #[test]
    fn opposed_strategy_clamps_to_zero() {
        let peers: HashMap<_, _> = [peer("peer-a", vec![1.0, 0.0], 0.5)].into_iter().collect();
        let strategy = StrategyEmbedding::new(0, vec![-1.0, 0.0]);
        assert_eq!(network_coherence("node-self", &strategy, &peers), 0.0);
    }

    #[test]
    fn coherence_stays_in_unit_interval() {
        let peers: HashMap<_, _> = [
            peer("peer-a", vec![0.3, -0.8, 0.5], 0.9),
            peer("peer-b", vec![-0.1, 0.4, 0.2], 0.2),
            peer("peer-c", vec![0.7, 0.1, -0.3], 0.6),
        ]
        .into_iter()
        .collect();
        let strategy = StrategyEmbedding::new(0, vec![0.2, 0.5, -0.1]);
        let coherence = network_coherence("node-self", &strategy, &peers);
        assert!((0.0..=1.0).contains(&coherence));
    }

    #[test]
    fn lone_node_is_trivially_coherent() {
        let strategy = StrategyEmbedding::new(0, vec![1.0]);
        assert_eq!(network_coherence("node-self", &strategy, &HashMap::new()), 1.0);
    }

    #[test]
    fn own_record_is_excluded_from_the_centroid() {
        let peers: HashMap<_, _> = [
            peer("node-self", vec![0.0, 1.0], 1.0),
            peer("peer-a", vec![1.0, 0.0], 0.5),
        ]
        .into_iter()
        .collect();
        // Only peer-a counts; own published record must not inflate coherence.
        let strategy = StrategyEmbedding::new(0, vec![0.0, 1.0]);
        assert_eq!(network_coherence("node-self", &strategy, &peers), 0.0);
    }

    #[test]
    fn zero_fitness_peers_yield_neutral_coherence() {
        let peers: HashMap<_, _> = [peer("peer-a", vec![1.0, 0.0], 0.0)].into_iter().collect();
        let strategy = StrategyEmbedding::new(0, vec![0.0, 1.0]);
        assert_eq!(network_coherence("node-self", &strategy, &peers), 1.0);
    }

    #[test]
    fn history_is_append_only_and_ordered() {
        let mut palace = MemoryPalace::new("node-a", 100);
        let peers = HashMap::new();

        for i in 0..5 {
            palace.record(
                StrategyEmbedding::new(i, vec![1.0]),
                &metrics(0.5),
                MarketConditions::new(),
                &peers,
                CycleFlags::default(),
            );
        }

        let history = palace.recent(5);
        assert_eq!(history.len(), 5);
        for pair in history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
            assert!(pair[0].strategy_embedding.generation < pair[1].strategy_embedding.generation);
        }
    }

    #[test]
    fn returned_snapshots_are_stable() {
        let mut palace = MemoryPalace::new("node-a", 100);
        let peers = HashMap::new();

        let first = palace.record(
            StrategyEmbedding::new(0, vec![1.0, 2.0]),
            &metrics(0.3),
            MarketConditions::new(),
            &peers,
            CycleFlags::default(),
        );
        palace.record(
            StrategyEmbedding::new(1, vec![9.0, 9.0]),
            &metrics(0.9),
            MarketConditions::new(),
            &peers,
            CycleFlags::default(),
        );

        let replay = palace.recent(2);
        assert_eq!(replay[0].strategy_embedding, first.strategy_embedding);
        assert_eq!(replay[0].fitness_score, first.fitness_score);
    }

    #[test]
    fn retention_cap_spills_to_overflow() {
        let mut palace = MemoryPalace::new("node-a", 3);
        let peers = HashMap::new();

        for i in 0..5 {
            palace.record(
                StrategyEmbedding::new(i, vec![1.0]),
                &metrics(0.5),
                MarketConditions::new(),
                &peers,
                CycleFlags::default(),
            );
        }

        assert_eq!(palace.len(), 3);
        assert_eq!(palace.total_recorded(), 5);
        let spilled = palace.drain_overflow();
        assert_eq!(spilled.len(), 2);
        assert_eq!(spilled[0].strategy_embedding.generation, 0);
        assert!(palace.drain_overflow().is_empty());
    }

    #[test]
    fn since_filters_by_timestamp() {
        let mut palace = MemoryPalace::new("node-a", 100);
        let peers = HashMap::new();

        palace.record(
            StrategyEmbedding::new(0, vec![1.0]),
            &metrics(0.5),
            MarketConditions::new(),
            &peers,
            CycleFlags::default(),
        );
        let cutoff = Utc::now();
        palace.record(
            StrategyEmbedding::new(1, vec![1.0]),
            &metrics(0.5),
            MarketConditions::new(),
            &peers,
            CycleFlags::default(),
        );

        let after = palace.since(cutoff);
        assert!(after.len() <= 2);
        assert!(after.iter().all(|s| s.timestamp >= cutoff));
        assert!(!after.is_empty());
    }

    #[test]
    fn flags_are_carried_into_the_snapshot() {
        let mut palace = MemoryPalace::new("node-a", 10);
        let state = palace.record(
            StrategyEmbedding::new(0, vec![1.0]),
            &metrics(0.5),
            MarketConditions::new(),
            &HashMap::new(),
            CycleFlags {
                unvalidated: true,
                stale_sync: true,
            },
        );
        assert!(state.unvalidated);
        assert!(state.stale_sync);
    }
}
