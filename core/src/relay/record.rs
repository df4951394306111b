//! Relay record — what the network knows about one relay node

use crate::address::{self, PeerAddress};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Records not refreshed within this window are stale (seconds)
pub const STALE_AFTER_SECS: u64 = 300;

/// Health score, always within [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct HealthScore(f32);

impl HealthScore {
    pub const MIN: HealthScore = HealthScore(0.0);
    pub const MAX: HealthScore = HealthScore(1.0);

    /// Clamp into range. NaN maps to 0.0.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            Self::MIN
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl From<f32> for HealthScore {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<HealthScore> for f32 {
    fn from(score: HealthScore) -> Self {
        score.0
    }
}

/// Information about a relay node, keyed by `peer_id`.
///
/// Serialized shape is shared with external callers of the read endpoint:
/// `{ peerId, addrs, alias?, lastSeen, healthScore }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRecord {
    /// Peer ID of the relay node
    pub peer_id: String,
    /// Addresses where this relay can be reached
    #[serde(deserialize_with = "lenient_addrs")]
    pub addrs: BTreeSet<PeerAddress>,
    /// Optional friendly name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Last observation (unix seconds)
    pub last_seen: u64,
    pub health_score: HealthScore,
}

impl RelayRecord {
    pub fn new(
        peer_id: impl Into<String>,
        addrs: impl IntoIterator<Item = PeerAddress>,
        alias: Option<String>,
        last_seen: u64,
        health_score: f32,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            addrs: addrs.into_iter().collect(),
            alias,
            last_seen,
            health_score: HealthScore::new(health_score),
        }
    }

    /// Seconds since last observation. A timestamp ahead of `now` counts as fresh.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_seen)
    }

    pub fn is_stale(&self, now: u64) -> bool {
        self.age(now) > STALE_AFTER_SECS
    }

    /// Fold a newer observation of the same peer into this record.
    ///
    /// Addresses are unioned, `last_seen` only moves forward, and the health
    /// score is replaced by the incoming value.
    pub fn absorb(&mut self, incoming: RelayRecord) {
        debug_assert_eq!(self.peer_id, incoming.peer_id);
        self.addrs.extend(incoming.addrs);
        self.last_seen = self.last_seen.max(incoming.last_seen);
        self.health_score = incoming.health_score;
        if incoming.alias.is_some() {
            self.alias = incoming.alias;
        }
    }
}

/// Addresses that fail validation are dropped rather than failing the record.
fn lenient_addrs<'de, D>(deserializer: D) -> Result<BTreeSet<PeerAddress>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .filter_map(|text| match address::validate(text) {
            Ok(addr) => Some(addr),
            Err(e) => {
                tracing::debug!("Dropping relay address {:?}: {}", text, e);
                None
            }
        })
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================
