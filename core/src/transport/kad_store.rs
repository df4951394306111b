//! Kademlia-backed [`DistributedStore`]

use super::swarm::SwarmHandle;
use crate::store::{DistributedStore, StoreError};
use async_trait::async_trait;

/// Routes store calls through the running swarm's Kademlia behaviour.
#[derive(Clone)]
pub struct KademliaStore {
    handle: SwarmHandle,
}

impl KademliaStore {
    pub fn new(handle: SwarmHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DistributedStore for KademliaStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.handle
            .get_record(key)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.handle
            .put_record(key, value)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
