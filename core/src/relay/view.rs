//! Registry View — the externally served relay list
//!
//! Each request pulls the published relay set into the local cache, prunes
//! stale entries and returns a snapshot. When the store is unreachable the
//! last-known cache is served instead.

use super::record::RelayRecord;
use super::registry::RelayRegistry;
use crate::store::RelayStoreAdapter;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RegistryView {
    registry: RelayRegistry,
    store: Option<RelayStoreAdapter>,
}

impl RegistryView {
    pub fn new(registry: RelayRegistry, store: Option<RelayStoreAdapter>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &RelayRegistry {
        &self.registry
    }

    /// Sync, prune, and snapshot the live relays at time `now`.
    pub async fn serve(&self, now: u64) -> Vec<RelayRecord> {
        if let Some(store) = &self.store {
            match store.fetch().await {
                Ok(records) => {
                    let fetched = records.len();
                    let mut fresh = 0;
                    for record in records.into_iter().filter(|r| !r.is_stale(now)) {
                        self.registry.upsert(record);
                        fresh += 1;
                    }
                    debug!("Synced {} of {} published relay records", fresh, fetched);
                }
                Err(e) => warn!("Serving cached relay list, store sync failed: {}", e),
            }
        }

        self.registry.prune(now);
        self.registry.list_live(now)
    }
}
