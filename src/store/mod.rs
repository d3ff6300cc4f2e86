//! Shared-state store client
//!
//! The coordination backend holds one [`NetworkRecord`] per node. Every node
//! reads all records but writes only its own, guarded by optimistic-
//! concurrency versioning; there are no distributed locks. A listener-push
//! transport may replace the polling read as long as the version-conflict
//! contract holds.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::NetworkRecord;
use crate::error::Result;

/// Outcome of a conditional write. A conflict is a normal protocol event,
/// not an error: the caller re-reads and retries under the orchestrator's
/// retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    /// Stored version differs from `expected_version`
    Conflict { current_version: u64 },
    /// Backend unavailable or rejected the write outright
    Failure { reason: String },
}

/// Peer records as seen at one sync round.
#[derive(Debug, Clone, Default)]
pub struct PeerSnapshot {
    pub records: HashMap<String, NetworkRecord>,
    /// True when the backend read failed and these are cached records
    pub stale: bool,
}

/// Coordination backend abstraction.
#[async_trait]
pub trait SharedStateStore: Send + Sync {
    /// Read every node's current record.
    async fn read_all(&self) -> Result<HashMap<String, NetworkRecord>>;

    /// Write the caller's own record, conditional on `expected_version`
    /// matching the stored version. `expected_version == 0` means "no record
    /// exists yet".
    async fn write(&self, record: &NetworkRecord, expected_version: u64) -> Result<WriteOutcome>;
}

/// Store wrapper that degrades instead of failing.
///
/// On a successful read the snapshot is cached; on a transient failure the
/// previous snapshot is returned annotated `stale: true`, so the caller can
/// proceed degraded rather than abort the cycle.
pub struct SyncClient {
    store: Arc<dyn SharedStateStore>,
    cached: RwLock<PeerSnapshot>,
}

impl SyncClient {
    pub fn new(store: Arc<dyn SharedStateStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(PeerSnapshot::default()),
        }
    }

    /// Pull the current peer records, falling back to the cached snapshot.
    pub async fn pull(&self) -> PeerSnapshot {
        match self.store.read_all().await {
            Ok(records) => {
                debug!(peers = records.len(), "peer snapshot refreshed");
                let snapshot = PeerSnapshot {
                    records,
                    stale: false,
                };
                *self.cached.write().await = snapshot.clone();
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "peer read failed, serving cached snapshot");
                let mut snapshot = self.cached.read().await.clone();
                snapshot.stale = true;
                snapshot
            }
        }
    }

    /// Last cached snapshot without touching the backend.
    pub async fn cached(&self) -> PeerSnapshot {
        self.cached.read().await.clone()
    }

    /// Conditional write, passed through to the backend.
    pub async fn publish(
        &self,
        record: &NetworkRecord,
        expected_version: u64,
    ) -> Result<WriteOutcome> {
        self.store.write(record, expected_version).await
    }
}
