//! In-memory store backend
//!
//! Backs tests and single-process simulations. Honors the same
//! version-conflict contract as a remote backend.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{SharedStateStore, WriteOutcome};
use crate::domain::NetworkRecord;
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, NetworkRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStateStore for InMemoryStore {
    async fn read_all(&self) -> Result<HashMap<String, NetworkRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn write(&self, record: &NetworkRecord, expected_version: u64) -> Result<WriteOutcome> {
        let mut records = self.records.write().await;
        let current_version = records.get(&record.node_id).map(|r| r.version).unwrap_or(0);

        if current_version != expected_version {
            return Ok(WriteOutcome::Conflict { current_version });
        }

        records.insert(record.node_id.clone(), record.clone());
        Ok(WriteOutcome::Success)
    }
}
