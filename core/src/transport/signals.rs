//! Reachability and relay metrics gathered from swarm events
//!
//! The swarm task writes, the auto-registrar reads through [`NodeSignals`].

use crate::relay::{NodeSignals, ReachabilitySignal, RelayMetrics};
use libp2p::{dcutr, Multiaddr};
use parking_lot::RwLock;
use std::time::{Duration, Instant};

/// Success rate reported before any attempt has been observed
const NEUTRAL_RATE: f64 = 0.5;

#[derive(Debug, Default)]
struct SignalState {
    publicly_reachable: bool,
    listen_addrs: Vec<Multiaddr>,
    external_addrs: Vec<Multiaddr>,
    connections: u32,
    connected_since: Option<Instant>,
    reservations_accepted: u64,
    reservations_denied: u64,
    active_circuits: u32,
    hole_punches_succeeded: u64,
    hole_punches_failed: u64,
}

#[derive(Debug, Default)]
pub struct SignalBoard {
    state: RwLock<SignalState>,
}

impl SignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_publicly_reachable(&self, reachable: bool) {
        self.state.write().publicly_reachable = reachable;
    }

    pub fn add_listen_addr(&self, addr: Multiaddr) {
        push_unique(&mut self.state.write().listen_addrs, addr);
    }

    pub fn remove_listen_addr(&self, addr: &Multiaddr) {
        self.state.write().listen_addrs.retain(|a| a != addr);
    }

    /// An address confirmed reachable from outside (AutoNAT)
    pub fn add_external_addr(&self, addr: Multiaddr) {
        push_unique(&mut self.state.write().external_addrs, addr);
    }

    pub fn remove_external_addr(&self, addr: &Multiaddr) {
        self.state.write().external_addrs.retain(|a| a != addr);
    }

    pub fn connection_established(&self) {
        let mut state = self.state.write();
        if state.connections == 0 {
            state.connected_since = Some(Instant::now());
        }
        state.connections += 1;
    }

    pub fn connection_closed(&self) {
        let mut state = self.state.write();
        state.connections = state.connections.saturating_sub(1);
        if state.connections == 0 {
            state.connected_since = None;
        }
    }

    pub fn record_reservation(&self, accepted: bool) {
        let mut state = self.state.write();
        if accepted {
            state.reservations_accepted += 1;
        } else {
            state.reservations_denied += 1;
        }
    }

    pub fn circuit_opened(&self) {
        self.state.write().active_circuits += 1;
    }

    pub fn circuit_closed(&self) {
        let mut state = self.state.write();
        state.active_circuits = state.active_circuits.saturating_sub(1);
    }

    pub fn record_hole_punch(&self, succeeded: bool) {
        let mut state = self.state.write();
        if succeeded {
            state.hole_punches_succeeded += 1;
        } else {
            state.hole_punches_failed += 1;
        }
    }

    /// Count the outcome of a DCUtR upgrade attempt
    pub fn observe_hole_punch(&self, event: &dcutr::Event) {
        self.record_hole_punch(event.result.is_ok());
    }
}

impl NodeSignals for SignalBoard {
    fn reachability(&self) -> ReachabilitySignal {
        let state = self.state.read();
        let mut listen_addrs = state.listen_addrs.clone();
        for addr in &state.external_addrs {
            push_unique(&mut listen_addrs, addr.clone());
        }
        ReachabilitySignal {
            publicly_reachable: state.publicly_reachable,
            listen_addrs,
        }
    }

    fn metrics(&self) -> RelayMetrics {
        let state = self.state.read();
        RelayMetrics {
            reservation_success_rate: rate(state.reservations_accepted, state.reservations_denied),
            uptime: state
                .connected_since
                .map(|since| since.elapsed())
                .unwrap_or(Duration::ZERO),
            active_relay_connections: state.active_circuits,
            hole_punch_success_rate: rate(state.hole_punches_succeeded, state.hole_punches_failed),
        }
    }
}

fn rate(ok: u64, failed: u64) -> f64 {
    let total = ok + failed;
    if total == 0 {
        NEUTRAL_RATE
    } else {
        ok as f64 / total as f64
    }
}

fn push_unique(addrs: &mut Vec<Multiaddr>, addr: Multiaddr) {
    if !addrs.contains(&addr) {
        addrs.push(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachability_merges_external_addrs() {
        let board = SignalBoard::new();
        let listen: Multiaddr = "/ip4/10.0.0.2/tcp/4001".parse().unwrap();
        let external: Multiaddr = "/ip4/8.8.8.8/tcp/4001".parse().unwrap();

        board.add_listen_addr(listen.clone());
        board.add_listen_addr(listen.clone());
        board.add_external_addr(external.clone());
        board.set_publicly_reachable(true);

        let signal = board.reachability();
        assert!(signal.publicly_reachable);
        assert_eq!(signal.listen_addrs, vec![listen.clone(), external]);

        board.remove_listen_addr(&listen);
        assert_eq!(board.reachability().listen_addrs.len(), 1);
    }

    #[test]
    fn test_rates_start_neutral() {
        let metrics = SignalBoard::new().metrics();
        assert_eq!(metrics.reservation_success_rate, NEUTRAL_RATE);
        assert_eq!(metrics.hole_punch_success_rate, NEUTRAL_RATE);
        assert_eq!(metrics.uptime, Duration::ZERO);
        assert_eq!(metrics.active_relay_connections, 0);
    }

    #[test]
    fn test_rates_and_circuits() {
        let board = SignalBoard::new();
        board.record_reservation(true);
        board.record_reservation(true);
        board.record_reservation(true);
        board.record_reservation(false);
        board.record_hole_punch(false);
        board.circuit_opened();
        board.circuit_opened();
        board.circuit_closed();
        board.circuit_closed();
        board.circuit_closed();

        let metrics = board.metrics();
        assert_eq!(metrics.reservation_success_rate, 0.75);
        assert_eq!(metrics.hole_punch_success_rate, 0.0);
        assert_eq!(metrics.active_relay_connections, 0);
    }

    #[test]
    fn test_dcutr_upgrades_feed_hole_punch_rate() {
        use libp2p::{swarm::ConnectionId, PeerId};

        let board = SignalBoard::new();
        board.record_hole_punch(false);
        for id in 1..=3 {
            board.observe_hole_punch(&dcutr::Event {
                remote_peer_id: PeerId::random(),
                result: Ok(ConnectionId::new_unchecked(id)),
            });
        }

        assert_eq!(board.metrics().hole_punch_success_rate, 0.75);
    }

    #[test]
    fn test_uptime_resets_when_disconnected() {
        let board = SignalBoard::new();
        board.connection_established();
        board.connection_established();
        board.connection_closed();
        assert!(board.state.read().connected_since.is_some());

        board.connection_closed();
        assert_eq!(board.metrics().uptime, Duration::ZERO);
    }
}
