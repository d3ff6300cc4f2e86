//! Autonomous evolutionary network node
//!
//! Each node in the fleet runs its own evolutionary cycle — generate a
//! candidate strategy, validate it, fold it into the learned strategy, and
//! synchronize with peers through a shared state store — converging the
//! fleet toward shared, improving behavior without central control.
//! Strategy generation and learning are external collaborators; this crate
//! is the orchestrator, the coherence protocol, and the typed seams between
//! them.

pub mod collaborators;
pub mod config;
pub mod domain;
pub mod error;
pub mod fitness;
pub mod memory;
pub mod node;
pub mod shutdown;
pub mod store;
pub mod validation;

pub use collaborators::{
    AlertChannel, LearningUpdater, MarketContextSource, MarketValidator, SnapshotSink,
    StrategyGenerator, Verdict,
};
pub use config::{NodeConfig, NodeType};
pub use domain::{
    FitnessMetrics, LearningDiagnostics, MarketConditions, NetworkRecord, NodeState,
    StrategyEmbedding,
};
pub use error::{AenError, Result};
pub use fitness::FitnessModel;
pub use memory::{network_coherence, CycleFlags, MemoryPalace};
pub use node::{Collaborators, CycleOutcome, CyclePhase, NodeOrchestrator};
pub use shutdown::{shutdown_pair, ShutdownController, ShutdownHandle};
pub use store::{InMemoryStore, PeerSnapshot, SharedStateStore, SyncClient, WriteOutcome};
pub use validation::{GateDecision, ValidationGate};
