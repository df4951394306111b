//! Distributed store adapter
//!
//! The relay record set lives under one namespaced key in a distributed
//! key-value store (Kademlia in a running node). Every call is best-effort:
//! failures and timeouts are reported as [`StoreError`] and callers fall back
//! to their local cache or retry on the next tick.

pub mod memory;

pub use memory::MemoryStore;

use crate::relay::RelayRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Key of the canonical relay record collection
pub const RELAY_REGISTRY_KEY: &str = "/relaymesh/relay-registry/v1";

/// Default bound on a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Store error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to decode relay records: {0}")]
    Decode(String),
    #[error("Failed to encode relay records: {0}")]
    Encode(String),
}

/// Minimal get/put view of the distributed key-value store.
///
/// `get` returning `Ok(None)` means nothing has been published yet.
#[async_trait]
pub trait DistributedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
}

/// Typed access to the relay record set with a bounded timeout per call.
#[derive(Clone)]
pub struct RelayStoreAdapter {
    store: Arc<dyn DistributedStore>,
    key: String,
    timeout: Duration,
}

impl RelayStoreAdapter {
    pub fn new(store: Arc<dyn DistributedStore>) -> Self {
        Self {
            store,
            key: RELAY_REGISTRY_KEY.to_string(),
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read the published relay set. Empty when nothing is published.
    pub async fn fetch(&self) -> Result<Vec<RelayRecord>, StoreError> {
        let value = tokio::time::timeout(self.timeout, self.store.get(&self.key))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        match value {
            Some(bytes) => decode_records(&bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the published relay set with `records`.
    pub async fn publish(&self, records: &[RelayRecord]) -> Result<(), StoreError> {
        let bytes = encode_records(records)?;
        tokio::time::timeout(self.timeout, self.store.put(&self.key, bytes))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

pub fn encode_records(records: &[RelayRecord]) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(records).map_err(|e| StoreError::Encode(e.to_string()))
}

/// Decode a published relay set.
///
/// The payload must be a JSON array. Individual entries that do not decode,
/// or carry an empty peer id, are skipped.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<RelayRecord>, StoreError> {
    let entries: Vec<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RelayRecord>(entry) {
            Ok(record) if !record.peer_id.is_empty() => Some(record),
            Ok(_) => {
                debug!("Skipping relay record without peer id");
                None
            }
            Err(e) => {
                debug!("Skipping undecodable relay record: {}", e);
                None
            }
        })
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================
