//! Auto-Registrar — periodic self-registration as a relay
//!
//! A node registers itself in the shared relay set when all of these hold:
//! 1. `enable_relay_server` is on
//! 2. AutoNAT reports the node as publicly reachable
//! 3. At least one listen address is public (non-private, non-loopback)
//! 4. A relay store is configured for this deployment
//!
//! Successful registrations are at least `min_interval` apart. A failed write
//! leaves the last registration time untouched, and the next attempt waits out
//! `retry_backoff` so an unreachable store is not hammered.

use super::health::{compute_health_score, HealthWeights, RelayMetrics};
use super::record::{HealthScore, RelayRecord};
use super::registry::RelayRegistry;
use crate::address::{self, PeerAddress};
use crate::clock::Clock;
use crate::store::{RelayStoreAdapter, StoreError};
use libp2p::{Multiaddr, PeerId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Minimum spacing between successful registrations
pub const MIN_REGISTRATION_INTERVAL: Duration = Duration::from_secs(60);

/// Wait after a failed write before trying again
pub const RETRY_BACKOFF: Duration = Duration::from_secs(15);

const MIN_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Reachability as reported by the NAT-detection component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilitySignal {
    pub publicly_reachable: bool,
    pub listen_addrs: Vec<Multiaddr>,
}

/// External inputs sampled on every tick
#[cfg_attr(test, mockall::automock)]
pub trait NodeSignals: Send + Sync {
    fn reachability(&self) -> ReachabilitySignal;
    fn metrics(&self) -> RelayMetrics;
}

/// Registrar configuration
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    pub enable_relay_server: bool,
    /// Friendly name published with our record
    pub alias: Option<String>,
    pub min_interval: Duration,
    /// Also the shortest period `run` will tick at
    pub retry_backoff: Duration,
    pub weights: HealthWeights,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            enable_relay_server: false,
            alias: None,
            min_interval: MIN_REGISTRATION_INTERVAL,
            retry_backoff: RETRY_BACKOFF,
            weights: HealthWeights::default(),
        }
    }
}

/// Why a tick did not attempt registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateClosed {
    RelayServerDisabled,
    NotPubliclyReachable,
    NoPublicAddress,
    NoStoreConfigured,
}

/// Result of one registrar tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(GateClosed),
    /// Registered too recently; eligible again in `retry_in_secs`
    RateLimited { retry_in_secs: u64 },
    /// The last write failed; next attempt in `retry_in_secs`
    BackingOff { retry_in_secs: u64 },
    /// Another tick is mid-registration
    InFlight,
    Registered(RelayRecord),
    StoreFailed(StoreError),
}

/// Per-node registration bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationState {
    pub last_registration: Option<u64>,
    pub last_failure: Option<u64>,
}

pub struct AutoRegistrar {
    local_peer_id: PeerId,
    config: RegistrarConfig,
    registry: RelayRegistry,
    store: Option<RelayStoreAdapter>,
    signals: Arc<dyn NodeSignals>,
    /// Held for the whole check-compute-write sequence
    state: Mutex<RegistrationState>,
}

impl AutoRegistrar {
    pub fn new(
        local_peer_id: PeerId,
        config: RegistrarConfig,
        registry: RelayRegistry,
        store: Option<RelayStoreAdapter>,
        signals: Arc<dyn NodeSignals>,
    ) -> Self {
        Self {
            local_peer_id,
            config,
            registry,
            store,
            signals,
            state: Mutex::new(RegistrationState::default()),
        }
    }

    pub async fn state(&self) -> RegistrationState {
        *self.state.lock().await
    }

    /// Run one gating / rate-limit / compute / write cycle at time `now`.
    pub async fn tick(&self, now: u64) -> TickOutcome {
        let reachability = self.signals.reachability();
        let (store, addrs) = match self.open_gates(&reachability) {
            Ok(open) => open,
            Err(reason) => {
                debug!("Relay self-registration skipped: {:?}", reason);
                return TickOutcome::Skipped(reason);
            }
        };

        let Ok(mut state) = self.state.try_lock() else {
            debug!("Relay self-registration already in flight");
            return TickOutcome::InFlight;
        };

        if let Some(last) = state.last_registration {
            let elapsed = now.saturating_sub(last);
            let min_interval = self.config.min_interval.as_secs();
            if elapsed < min_interval {
                debug!("Relay self-registration rate limited ({}s since last)", elapsed);
                return TickOutcome::RateLimited {
                    retry_in_secs: min_interval - elapsed,
                };
            }
        }

        if let Some(failed_at) = state.last_failure {
            let elapsed = now.saturating_sub(failed_at);
            let backoff = self.config.retry_backoff.as_secs();
            if elapsed < backoff {
                debug!("Relay self-registration backing off ({}s since failure)", elapsed);
                return TickOutcome::BackingOff {
                    retry_in_secs: backoff - elapsed,
                };
            }
        }

        let score = compute_health_score(&self.signals.metrics(), &self.config.weights);
        let record = self.local_record(addrs, now, score);
        let relay_set = self.relay_set_with(store, &record, now).await;

        match store.publish(&relay_set).await {
            Ok(()) => {
                self.registry.upsert(record.clone());
                state.last_registration = Some(now);
                state.last_failure = None;
                info!(
                    "Registered as relay: {} ({} addrs, health: {:.2})",
                    record.peer_id,
                    record.addrs.len(),
                    score.value()
                );
                TickOutcome::Registered(record)
            }
            Err(e) => {
                state.last_failure = Some(now);
                warn!(
                    "Relay self-registration failed, retrying in {:?}: {}",
                    self.config.retry_backoff, e
                );
                TickOutcome::StoreFailed(e)
            }
        }
    }

    /// Tick every `period` until `shutdown` flips to true or its sender is
    /// dropped. Shutdown is only observed between ticks. Periods shorter than
    /// `retry_backoff` (or one second) are raised to it.
    pub async fn run(
        self: Arc<Self>,
        period: Duration,
        clock: Arc<dyn Clock>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let floor = self.config.retry_backoff.max(MIN_TICK_PERIOD);
        if period < floor {
            warn!("Registrar period {:?} too short, using {:?}", period, floor);
        }
        let period = period.max(floor);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Relay auto-registrar started (every {:?})", period);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let outcome = self.tick(clock.now_secs()).await;
                    debug!("Registrar tick: {:?}", outcome);
                }
            }
        }

        info!("Relay auto-registrar stopped");
    }

    fn open_gates(
        &self,
        reachability: &ReachabilitySignal,
    ) -> Result<(&RelayStoreAdapter, BTreeSet<PeerAddress>), GateClosed> {
        if !self.config.enable_relay_server {
            return Err(GateClosed::RelayServerDisabled);
        }
        if !reachability.publicly_reachable {
            return Err(GateClosed::NotPubliclyReachable);
        }

        let addrs: BTreeSet<PeerAddress> = reachability
            .listen_addrs
            .iter()
            .filter(|addr| address::is_publicly_routable(addr))
            .filter_map(|addr| PeerAddress::with_peer(addr, self.local_peer_id).ok())
            .collect();
        if addrs.is_empty() {
            return Err(GateClosed::NoPublicAddress);
        }

        let store = self.store.as_ref().ok_or(GateClosed::NoStoreConfigured)?;
        Ok((store, addrs))
    }

    fn local_record(
        &self,
        addrs: BTreeSet<PeerAddress>,
        now: u64,
        score: HealthScore,
    ) -> RelayRecord {
        RelayRecord {
            peer_id: self.local_peer_id.to_string(),
            addrs,
            alias: self.config.alias.clone(),
            last_seen: now,
            health_score: score,
        }
    }

    /// The full relay set this node will publish: whatever the store holds,
    /// merged with our live cache, with our own entry replaced.
    async fn relay_set_with(
        &self,
        store: &RelayStoreAdapter,
        own: &RelayRecord,
        now: u64,
    ) -> Vec<RelayRecord> {
        match store.fetch().await {
            Ok(published) => {
                for record in published.into_iter().filter(|r| !r.is_stale(now)) {
                    self.registry.upsert(record);
                }
            }
            Err(e) => warn!("Publishing from local cache, store read failed: {}", e),
        }

        let mut set: HashMap<String, RelayRecord> = self
            .registry
            .list_live(now)
            .into_iter()
            .map(|r| (r.peer_id.clone(), r))
            .collect();
        set.insert(own.peer_id.clone(), own.clone());

        let mut records: Vec<RelayRecord> = set.into_values().collect();
        records.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        records
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DistributedStore, MemoryStore, RELAY_REGISTRY_KEY};

    fn public_signals(metrics: RelayMetrics) -> MockNodeSignals {
        let mut signals = MockNodeSignals::new();
        signals.expect_reachability().returning(|| ReachabilitySignal {
            publicly_reachable: true,
            listen_addrs: vec![
                "/ip4/127.0.0.1/tcp/4001".parse().unwrap(),
                "/ip4/8.8.8.8/tcp/4001".parse().unwrap(),
            ],
        });
        signals.expect_metrics().returning(move || metrics);
        signals
    }

    fn relay_config() -> RegistrarConfig {
        RegistrarConfig {
            enable_relay_server: true,
            alias: Some("test-relay".to_string()),
            ..RegistrarConfig::default()
        }
    }

    fn registrar(
        config: RegistrarConfig,
        store: Option<Arc<MemoryStore>>,
        signals: MockNodeSignals,
    ) -> (AutoRegistrar, RelayRegistry) {
        let registry = RelayRegistry::new();
        let adapter = store.map(|s| RelayStoreAdapter::new(s as Arc<dyn DistributedStore>));
        let registrar = AutoRegistrar::new(
            PeerId::random(),
            config,
            registry.clone(),
            adapter,
            Arc::new(signals),
        );
        (registrar, registry)
    }

    #[tokio::test]
    async fn test_registers_when_all_gates_open() {
        let store = Arc::new(MemoryStore::new());
        let (registrar, registry) =
            registrar(relay_config(), Some(store.clone()), public_signals(RelayMetrics::default()));

        let outcome = registrar.tick(1_000).await;
        let TickOutcome::Registered(record) = outcome else {
            panic!("expected registration, got {:?}", outcome);
        };

        assert_eq!(record.addrs.len(), 1, "loopback address must not be published");
        assert_eq!(record.alias.as_deref(), Some("test-relay"));
        assert_eq!(record.last_seen, 1_000);
        assert_eq!(store.put_count(), 1);
        assert!(registry.contains(&record.peer_id));
        assert_eq!(registrar.state().await.last_registration, Some(1_000));
    }

    #[tokio::test]
    async fn test_relay_server_disabled_never_registers() {
        let store = Arc::new(MemoryStore::new());
        let config = RegistrarConfig {
            enable_relay_server: false,
            ..relay_config()
        };
        let (registrar, registry) =
            registrar(config, Some(store.clone()), public_signals(RelayMetrics::default()));

        for now in [0, 61, 122, 1_000] {
            assert_eq!(
                registrar.tick(now).await,
                TickOutcome::Skipped(GateClosed::RelayServerDisabled)
            );
        }
        assert_eq!(store.put_count(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_not_reachable_skips() {
        let mut signals = MockNodeSignals::new();
        signals.expect_reachability().returning(|| ReachabilitySignal {
            publicly_reachable: false,
            listen_addrs: vec!["/ip4/8.8.8.8/tcp/4001".parse().unwrap()],
        });
        signals.expect_metrics().never();

        let (registrar, _) = registrar(relay_config(), Some(Arc::new(MemoryStore::new())), signals);
        assert_eq!(
            registrar.tick(0).await,
            TickOutcome::Skipped(GateClosed::NotPubliclyReachable)
        );
    }

    #[tokio::test]
    async fn test_private_addresses_only_skips() {
        let mut signals = MockNodeSignals::new();
        signals.expect_reachability().returning(|| ReachabilitySignal {
            publicly_reachable: true,
            listen_addrs: vec![
                "/ip4/192.168.1.4/tcp/4001".parse().unwrap(),
                "/ip4/127.0.0.1/tcp/4001".parse().unwrap(),
            ],
        });
        signals.expect_metrics().never();

        let (registrar, _) = registrar(relay_config(), Some(Arc::new(MemoryStore::new())), signals);
        assert_eq!(
            registrar.tick(0).await,
            TickOutcome::Skipped(GateClosed::NoPublicAddress)
        );
    }

    #[tokio::test]
    async fn test_missing_store_skips() {
        let (registrar, _) = registrar(relay_config(), None, public_signals(RelayMetrics::default()));
        assert_eq!(
            registrar.tick(0).await,
            TickOutcome::Skipped(GateClosed::NoStoreConfigured)
        );
    }

    #[tokio::test]
    async fn test_rate_limit_window() {
        let store = Arc::new(MemoryStore::new());
        let (registrar, _) =
            registrar(relay_config(), Some(store.clone()), public_signals(RelayMetrics::default()));

        assert!(matches!(registrar.tick(0).await, TickOutcome::Registered(_)));
        assert_eq!(
            registrar.tick(30).await,
            TickOutcome::RateLimited { retry_in_secs: 30 }
        );
        assert_eq!(store.put_count(), 1);

        assert!(matches!(registrar.tick(61).await, TickOutcome::Registered(_)));
        assert_eq!(store.put_count(), 2);
        assert_eq!(registrar.state().await.last_registration, Some(61));
    }

    #[tokio::test]
    async fn test_failed_write_is_retried_after_backoff() {
        let store = Arc::new(MemoryStore::new());
        let (registrar, registry) =
            registrar(relay_config(), Some(store.clone()), public_signals(RelayMetrics::default()));

        store.set_available(false);
        assert!(matches!(registrar.tick(0).await, TickOutcome::StoreFailed(_)));
        assert_eq!(registrar.state().await.last_registration, None);
        assert!(registry.is_empty());

        store.set_available(true);
        assert_eq!(
            registrar.tick(10).await,
            TickOutcome::BackingOff { retry_in_secs: 5 }
        );
        assert!(matches!(registrar.tick(15).await, TickOutcome::Registered(_)));

        let state = registrar.state().await;
        assert_eq!(state.last_registration, Some(15));
        assert_eq!(state.last_failure, None);
    }

    #[tokio::test]
    async fn test_health_score_is_clamped() {
        let metrics = RelayMetrics {
            reservation_success_rate: 40.0,
            uptime: Duration::from_secs(1_000_000),
            active_relay_connections: 10_000,
            hole_punch_success_rate: 3.0,
        };
        let (registrar, _) = registrar(
            relay_config(),
            Some(Arc::new(MemoryStore::new())),
            public_signals(metrics),
        );

        let TickOutcome::Registered(record) = registrar.tick(0).await else {
            panic!("expected registration");
        };
        assert!(record.health_score.value() <= 1.0);
        assert!(record.health_score.value() >= 0.0);
    }

    #[tokio::test]
    async fn test_publish_keeps_other_relays() {
        let store = Arc::new(MemoryStore::new());
        let other = PeerId::random();
        let other_addr =
            address::validate(&format!("/ip4/9.9.9.9/tcp/4001/p2p/{}", other)).unwrap();
        let existing = vec![RelayRecord::new(other.to_string(), vec![other_addr], None, 990, 0.6)];
        store.insert_raw(RELAY_REGISTRY_KEY, crate::store::encode_records(&existing).unwrap());

        let (registrar, _) =
            registrar(relay_config(), Some(store.clone()), public_signals(RelayMetrics::default()));
        assert!(matches!(registrar.tick(1_000).await, TickOutcome::Registered(_)));

        let published = RelayStoreAdapter::new(store).fetch().await.unwrap();
        assert_eq!(published.len(), 2);
        assert!(published.iter().any(|r| r.peer_id == other.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ticks_single_flight() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(500)));
        let (registrar, _) =
            registrar(relay_config(), Some(store.clone()), public_signals(RelayMetrics::default()));
        let registrar = Arc::new(registrar);

        let (a, b) = tokio::join!(registrar.tick(0), registrar.tick(0));

        let registered = [&a, &b]
            .iter()
            .filter(|o| matches!(o, TickOutcome::Registered(_)))
            .count();
        assert_eq!(registered, 1, "outcomes: {:?} {:?}", a, b);
        assert!(matches!(a, TickOutcome::InFlight) || matches!(b, TickOutcome::InFlight));
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_zero_period_does_not_panic() {
        let store = Arc::new(MemoryStore::new());
        let (registrar, _) =
            registrar(relay_config(), Some(store.clone()), public_signals(RelayMetrics::default()));
        let clock = Arc::new(crate::clock::ManualClock::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::new(registrar).run(Duration::ZERO, clock, shutdown_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.put_count(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_does_not_hammer_failing_store() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let (registrar, _) =
            registrar(relay_config(), Some(store.clone()), public_signals(RelayMetrics::default()));
        let registrar = Arc::new(registrar);
        let clock = Arc::new(crate::clock::ManualClock::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(registrar.clone().run(
            Duration::from_millis(100),
            clock.clone(),
            shutdown_rx,
        ));

        // One attempt per raised 15s period: t=0, 15, 30, 45, 60
        for _ in 0..60 {
            clock.advance(1);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert!(store.get_count() <= 5, "attempts: {}", store.get_count());
        assert_eq!(registrar.state().await.last_registration, None);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let (registrar, _) =
            registrar(relay_config(), Some(store.clone()), public_signals(RelayMetrics::default()));
        let registrar = Arc::new(registrar);
        let clock = Arc::new(crate::clock::ManualClock::new(0));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(registrar.clone().run(
            Duration::from_secs(60),
            clock.clone(),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.put_count(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        clock.advance(600);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(store.put_count(), 1);
    }
}
