//! Relay Registry — process-wide cache of known relay nodes
//!
//! Shared between the auto-registrar and the read path. The lock is held for
//! map mutation only, never across a network call.

use super::record::RelayRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// In-memory registry of relay nodes
#[derive(Clone, Default)]
pub struct RelayRegistry {
    /// peer_id -> RelayRecord
    entries: Arc<RwLock<HashMap<String, RelayRecord>>>,
}

impl RelayRegistry {
    /// Create a new empty relay registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new relay or fold an observation into the existing entry.
    ///
    /// Returns true when the peer was not known before.
    pub fn upsert(&self, record: RelayRecord) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&record.peer_id) {
            Some(existing) => {
                debug!(
                    "Updated relay: {} (health: {:.2})",
                    record.peer_id,
                    record.health_score.value()
                );
                existing.absorb(record);
                false
            }
            None => {
                info!(
                    "Registered new relay: {} (alias: {:?}, health: {:.2})",
                    record.peer_id,
                    record.alias,
                    record.health_score.value()
                );
                entries.insert(record.peer_id.clone(), record);
                true
            }
        }
    }

    /// Snapshot of all non-stale relays, best health first.
    pub fn list_live(&self, now: u64) -> Vec<RelayRecord> {
        let mut relays: Vec<RelayRecord> = {
            let entries = self.entries.read();
            entries
                .values()
                .filter(|relay| !relay.is_stale(now))
                .cloned()
                .collect()
        };

        relays.sort_by(|a, b| {
            b.health_score
                .partial_cmp(&a.health_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        relays
    }

    /// Remove every stale entry. Returns the number removed.
    pub fn prune(&self, now: u64) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();

        entries.retain(|peer_id, relay| {
            let stale = relay.is_stale(now);
            if stale {
                debug!(
                    "Removing stale relay: {} (last seen {} seconds ago)",
                    peer_id,
                    relay.age(now)
                );
            }
            !stale
        });

        let removed = before - entries.len();
        if removed > 0 {
            info!("Pruned {} stale relay entries", removed);
        }
        removed
    }

    /// Get a specific relay by peer_id
    pub fn get(&self, peer_id: &str) -> Option<RelayRecord> {
        self.entries.read().get(peer_id).cloned()
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.entries.read().contains_key(peer_id)
    }

    /// Number of entries, stale ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove a specific relay. Returns true if it was present.
    pub fn remove(&self, peer_id: &str) -> bool {
        let removed = self.entries.write().remove(peer_id).is_some();
        if removed {
            info!("Removed relay: {}", peer_id);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================
