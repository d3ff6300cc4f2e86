//! Node orchestrator
//!
//! Drives the evolutionary cycle: sync with the fleet, generate a candidate,
//! gate it, fold it in, record the snapshot, publish upstream, sleep. Owns
//! timing, timeouts, publish retries, and the error-escalation policy; all
//! node state is owned by this single loop.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::collaborators::{
    AlertChannel, LearningUpdater, MarketContextSource, MarketValidator, SnapshotSink,
    StrategyGenerator,
};
use crate::config::NodeConfig;
use crate::domain::{FitnessMetrics, NetworkRecord, NodeState};
use crate::error::{AenError, Result};
use crate::fitness::FitnessModel;
use crate::memory::{CycleFlags, MemoryPalace};
use crate::shutdown::{shutdown_pair, ShutdownController, ShutdownHandle};
use crate::store::{PeerSnapshot, SharedStateStore, SyncClient, WriteOutcome};
use crate::validation::ValidationGate;

use super::phase::{CyclePhase, PhaseTracker};

/// Consecutive full-cycle failures before fatal escalation.
const FATAL_ERROR_THRESHOLD: u32 = 3;

/// External collaborators wired into the orchestrator at construction.
pub struct Collaborators {
    pub store: Arc<dyn SharedStateStore>,
    pub market: Arc<dyn MarketContextSource>,
    pub generator: Arc<dyn StrategyGenerator>,
    pub updater: Arc<dyn LearningUpdater>,
    /// Required when `enable_market_validation` is set
    pub validator: Option<Arc<dyn MarketValidator>>,
    /// Durable sink for snapshots evicted from in-memory retention
    pub sink: Option<Arc<dyn SnapshotSink>>,
    /// Out-of-band channel, fired only on fatal escalation
    pub alerts: Option<Arc<dyn AlertChannel>>,
}

/// How one cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Snapshot appended; `published` is false when the publish was skipped
    /// as a soft failure
    Completed { published: bool },
    /// Validation gate rejected the candidate; no snapshot appended
    Rejected { reason: String },
}

/// The evolutionary-cycle orchestrator for one node.
pub struct NodeOrchestrator {
    config: NodeConfig,
    fitness: FitnessModel,
    gate: ValidationGate,
    sync: SyncClient,
    memory: MemoryPalace,
    market: Arc<dyn MarketContextSource>,
    generator: Arc<dyn StrategyGenerator>,
    updater: Arc<dyn LearningUpdater>,
    sink: Option<Arc<dyn SnapshotSink>>,
    alerts: Option<Arc<dyn AlertChannel>>,
    phase: PhaseTracker,
    controller: ShutdownController,
    shutdown: ShutdownHandle,
    /// Last metrics produced by a completed cycle, fed back to generation
    current_metrics: FitnessMetrics,
    /// Last known version of this node's own network record (0 = none)
    own_version: u64,
    consecutive_errors: u32,
    cycles_completed: u64,
    publish_soft_failures: u64,
}

impl NodeOrchestrator {
    /// Construct a node from validated config and its collaborators.
    ///
    /// Fails immediately on inconsistent wiring; a construction failure is
    /// reported through the alert channel when one is supplied.
    pub async fn new(config: NodeConfig, collaborators: Collaborators) -> Result<Self> {
        let alerts = collaborators.alerts.clone();
        match Self::build(config, collaborators) {
            Ok(node) => Ok(node),
            Err(e) => {
                if let Some(alerts) = alerts {
                    let _ = alerts
                        .alert("(unconstructed)", &format!("node construction failed: {e}"))
                        .await;
                }
                Err(e)
            }
        }
    }

    fn build(config: NodeConfig, collaborators: Collaborators) -> Result<Self> {
        let gate = if config.enable_market_validation {
            let validator = collaborators.validator.ok_or_else(|| {
                AenError::InvalidConfig(
                    "enable_market_validation is set but no market validator was supplied".into(),
                )
            })?;
            info!(node_id = %config.node_id, "market validation enabled");
            ValidationGate::enabled(validator)
        } else {
            warn!(node_id = %config.node_id, "market validation disabled, snapshots will be flagged unvalidated");
            ValidationGate::disabled()
        };

        let (controller, shutdown) = shutdown_pair();

        info!(
            node_id = %config.node_id,
            node_type = %config.node_type,
            region = %config.network_region,
            "node initialized"
        );

        Ok(Self {
            fitness: FitnessModel::new(config.node_type),
            gate,
            sync: SyncClient::new(collaborators.store),
            memory: MemoryPalace::new(&config.node_id, config.max_history_entries),
            market: collaborators.market,
            generator: collaborators.generator,
            updater: collaborators.updater,
            sink: collaborators.sink,
            alerts: collaborators.alerts,
            phase: PhaseTracker::new(),
            controller,
            shutdown,
            current_metrics: FitnessMetrics::neutral(),
            own_version: 0,
            consecutive_errors: 0,
            cycles_completed: 0,
            publish_soft_failures: 0,
            config,
        })
    }

    /// Handle for requesting shutdown from another task.
    pub fn controller(&self) -> ShutdownController {
        self.controller.clone()
    }

    /// Request graceful shutdown after the in-flight cycle completes.
    pub fn stop(&self) {
        self.controller.request();
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase.current()
    }

    pub fn memory(&self) -> &MemoryPalace {
        &self.memory
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Publishes skipped after exhausting conflict retries.
    pub fn publish_soft_failures(&self) -> u64 {
        self.publish_soft_failures
    }

    /// Run the evolutionary cycle until cancelled or fatally escalated.
    pub async fn start(&mut self) -> Result<()> {
        info!(node_id = %self.config.node_id, "starting evolutionary cycle");

        loop {
            if self.shutdown.is_requested() {
                // Stop requested before the first cycle leaves INIT.
                if !self.phase.current().can_transition_to(CyclePhase::Shutdown) {
                    self.phase.transition(CyclePhase::Error)?;
                }
                self.phase.transition(CyclePhase::Shutdown)?;
                info!(node_id = %self.config.node_id, "shutdown complete");
                return Ok(());
            }

            let cycle_start = Instant::now();

            match self.run_cycle().await {
                Ok(outcome) => {
                    self.consecutive_errors = 0;
                    self.cycles_completed += 1;
                    debug!(
                        node_id = %self.config.node_id,
                        cycle = self.cycles_completed,
                        ?outcome,
                        "cycle completed"
                    );
                }
                Err(AenError::Cancelled) => {
                    // Abandoned at a checkpoint; route through ERROR to the
                    // terminal state, which is only reachable from IDLE/ERROR.
                    if self.phase.current() != CyclePhase::Error {
                        self.phase.transition(CyclePhase::Error)?;
                    }
                    self.phase.transition(CyclePhase::Shutdown)?;
                    info!(node_id = %self.config.node_id, "cycle abandoned on shutdown request");
                    return Ok(());
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    error!(
                        node_id = %self.config.node_id,
                        phase = %self.phase.current(),
                        consecutive = self.consecutive_errors,
                        error = %e,
                        "evolutionary cycle error"
                    );
                    if self.phase.current() != CyclePhase::Error {
                        self.phase.transition(CyclePhase::Error)?;
                    }

                    if self.consecutive_errors >= FATAL_ERROR_THRESHOLD {
                        return self.escalate_fatal(e).await;
                    }
                }
            }

            self.sleep_remainder(cycle_start).await;
        }
    }

    /// One pass through SYNCING → ... → IDLE.
    async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        // SYNCING: degrade to the cached snapshot on failure or timeout.
        self.checkpoint()?;
        self.phase.transition(CyclePhase::Syncing)?;
        let peers = self.pull_peers().await;
        if peers.stale {
            warn!(node_id = %self.config.node_id, "proceeding with stale peer snapshot");
        }
        self.refresh_own_version(&peers);

        // GENERATING
        self.checkpoint()?;
        self.phase.transition(CyclePhase::Generating)?;
        let context = self
            .timed("market_context", self.market.snapshot())
            .await?;
        let candidate = self
            .timed(
                "generate",
                self.generator.generate(&context, &self.current_metrics),
            )
            .await?;
        debug!(
            node_id = %self.config.node_id,
            candidate_id = %candidate.id,
            generation = candidate.generation,
            "candidate generated"
        );

        // VALIDATING: rejection ends the cycle early but still refreshes the
        // peer cache before idling.
        self.checkpoint()?;
        self.phase.transition(CyclePhase::Validating)?;
        let decision = self
            .timed("validate", self.gate.check(&candidate, &context))
            .await?;
        if let crate::validation::GateDecision::Rejected { reason } = &decision {
            info!(node_id = %self.config.node_id, %reason, "cycle ended early on rejection");
            let _ = self.pull_peers().await;
            self.phase.transition(CyclePhase::Idle)?;
            return Ok(CycleOutcome::Rejected {
                reason: reason.clone(),
            });
        }

        // LEARNING
        self.checkpoint()?;
        self.phase.transition(CyclePhase::Learning)?;
        let history = self.memory.recent(64);
        let (strategy, diagnostics) = self
            .timed("learn", self.updater.update(&candidate, &history))
            .await?;
        debug!(
            node_id = %self.config.node_id,
            loss = diagnostics.loss,
            exploration_rate = diagnostics.exploration_rate,
            updates = diagnostics.updates_applied,
            "learning update applied"
        );

        // PUBLISHING: record the snapshot, then attempt the conditional write.
        self.checkpoint()?;
        self.phase.transition(CyclePhase::Publishing)?;
        let metrics = self.fitness.score(&strategy, &context, &history);
        let flags = CycleFlags {
            unvalidated: decision.unvalidated(),
            stale_sync: peers.stale,
        };
        let state = self
            .memory
            .record(strategy, &metrics, context, &peers.records, flags);
        self.current_metrics = metrics;

        self.spill_overflow().await;
        let published = self.publish(&state).await?;

        self.phase.transition(CyclePhase::Idle)?;
        Ok(CycleOutcome::Completed { published })
    }

    /// Pull peer records under the call timeout, degrading to cache.
    async fn pull_peers(&self) -> PeerSnapshot {
        let deadline = Duration::from_millis(self.config.call_timeout_ms);
        match tokio::time::timeout(deadline, self.sync.pull()).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                warn!(
                    node_id = %self.config.node_id,
                    timeout_ms = self.config.call_timeout_ms,
                    "peer sync timed out, serving cached snapshot"
                );
                let mut snapshot = self.sync.cached().await;
                snapshot.stale = true;
                snapshot
            }
        }
    }

    /// Adopt a newer version of our own record observed in a sync round
    /// (e.g. written by a previous process instance).
    fn refresh_own_version(&mut self, peers: &PeerSnapshot) {
        if let Some(own) = peers.records.get(&self.config.node_id) {
            if own.version > self.own_version {
                debug!(
                    node_id = %self.config.node_id,
                    observed = own.version,
                    known = self.own_version,
                    "adopting newer own-record version from sync"
                );
                self.own_version = own.version;
            }
        }
    }

    /// Conditional publish with re-read-and-retry on version conflict.
    ///
    /// Returns false when the publish was skipped as a soft failure; only a
    /// transport-level error propagates.
    async fn publish(&mut self, state: &NodeState) -> Result<bool> {
        let mut expected = self.own_version;
        let mut attempts: u32 = 0;

        loop {
            let record = NetworkRecord {
                node_id: self.config.node_id.clone(),
                strategy_embedding: state.strategy_embedding.clone(),
                fitness_score: state.fitness_score,
                published_at: chrono::Utc::now(),
                version: expected + 1,
            };

            let outcome = self
                .timed("publish", self.sync.publish(&record, expected))
                .await?;

            match outcome {
                WriteOutcome::Success => {
                    self.own_version = record.version;
                    debug!(
                        node_id = %self.config.node_id,
                        version = record.version,
                        "network record published"
                    );
                    return Ok(true);
                }
                WriteOutcome::Conflict { current_version } => {
                    attempts += 1;
                    if attempts > self.config.max_retry_attempts {
                        self.publish_soft_failures += 1;
                        warn!(
                            node_id = %self.config.node_id,
                            attempts,
                            current_version,
                            "publish skipped after conflicting retries (soft failure)"
                        );
                        self.own_version = current_version;
                        return Ok(false);
                    }
                    debug!(
                        node_id = %self.config.node_id,
                        attempt = attempts,
                        current_version,
                        "publish conflict, re-reading and retrying"
                    );
                    expected = current_version;
                    let jitter: u64 = rand::thread_rng().gen_range(10..50);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
                WriteOutcome::Failure { reason } => {
                    self.publish_soft_failures += 1;
                    warn!(
                        node_id = %self.config.node_id,
                        %reason,
                        "publish rejected by backend (soft failure)"
                    );
                    return Ok(false);
                }
            }
        }
    }

    /// Hand snapshots evicted by the retention cap to the persistence sink.
    async fn spill_overflow(&mut self) {
        let evicted = self.memory.drain_overflow();
        if evicted.is_empty() {
            return;
        }
        let Some(sink) = &self.sink else {
            debug!(
                node_id = %self.config.node_id,
                dropped = evicted.len(),
                "no persistence sink configured, dropping evicted snapshots"
            );
            return;
        };
        if let Err(e) = sink.persist(&evicted).await {
            warn!(node_id = %self.config.node_id, error = %e, "snapshot spill failed");
        }
    }

    async fn escalate_fatal(&mut self, last: AenError) -> Result<()> {
        let fatal = AenError::FatalCycle {
            consecutive: self.consecutive_errors,
            last: last.to_string(),
        };
        error!(node_id = %self.config.node_id, error = %fatal, "fatal escalation, shutting down");

        if let Some(alerts) = &self.alerts {
            if let Err(e) = alerts.alert(&self.config.node_id, &fatal.to_string()).await {
                error!(node_id = %self.config.node_id, error = %e, "fatal alert delivery failed");
            }
        }

        self.phase.transition(CyclePhase::Shutdown)?;
        Err(fatal)
    }

    /// Sleep out the remainder of the cycle interval, waking early on
    /// shutdown. Guarantees a floor between cycle starts, never an exact
    /// period under load.
    async fn sleep_remainder(&mut self, cycle_start: Instant) {
        let interval = Duration::from_secs(self.config.sync_interval_seconds);
        let elapsed = cycle_start.elapsed();
        let Some(remaining) = interval.checked_sub(elapsed) else {
            debug!(
                node_id = %self.config.node_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "cycle overran its interval, starting next immediately"
            );
            return;
        };

        tokio::select! {
            _ = self.shutdown.requested() => {}
            _ = tokio::time::sleep(remaining) => {}
        }
    }

    /// Cooperative cancellation checkpoint, observed at the top of each phase.
    fn checkpoint(&self) -> Result<()> {
        if self.shutdown.is_requested() {
            Err(AenError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Apply the per-call deadline to an external operation.
    async fn timed<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = Duration::from_millis(self.config.call_timeout_ms);
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(AenError::Timeout {
                operation: operation.to_string(),
                elapsed_ms: self.config.call_timeout_ms,
            }),
        }
    }
}
