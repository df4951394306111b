//! Relay health scoring
//!
//! A weighted blend of four connection-tracker metrics, each normalised to
//! [0, 1] before weighting. The result is clamped again so that out-of-range
//! inputs or odd weights can never produce a score outside [0, 1].

use super::record::HealthScore;
use std::time::Duration;

/// Weight for relay reservation success rate
const RESERVATION_WEIGHT: f64 = 0.35;

/// Weight for connection uptime
const UPTIME_WEIGHT: f64 = 0.25;

/// Weight for active relay connection count
const CONNECTIONS_WEIGHT: f64 = 0.20;

/// Weight for hole-punch success rate
const HOLE_PUNCH_WEIGHT: f64 = 0.20;

/// Uptime at which the uptime component maxes out
const UPTIME_SATURATION: Duration = Duration::from_secs(3600);

/// Active relay connections at which the connection component maxes out
const CONNECTION_SATURATION: u32 = 16;

/// Metrics sampled from the connection tracker on each registrar tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RelayMetrics {
    /// Accepted / requested relay reservations (0.0 - 1.0)
    pub reservation_success_rate: f64,
    /// How long the node has been connected to the network
    pub uptime: Duration,
    /// Relay circuits currently open through this node
    pub active_relay_connections: u32,
    /// Successful / attempted hole punches (0.0 - 1.0)
    pub hole_punch_success_rate: f64,
}

/// Weights and saturation points for [`compute_health_score`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthWeights {
    pub reservation: f64,
    pub uptime: f64,
    pub connections: f64,
    pub hole_punch: f64,
    pub uptime_saturation: Duration,
    pub connection_saturation: u32,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            reservation: RESERVATION_WEIGHT,
            uptime: UPTIME_WEIGHT,
            connections: CONNECTIONS_WEIGHT,
            hole_punch: HOLE_PUNCH_WEIGHT,
            uptime_saturation: UPTIME_SATURATION,
            connection_saturation: CONNECTION_SATURATION,
        }
    }
}

/// Compute the composite health score for the local relay.
///
/// Weights are normalised by their sum, so they need not add up to 1.
/// Negative or non-finite weights count as zero; if nothing is left the
/// score is 0.
pub fn compute_health_score(metrics: &RelayMetrics, weights: &HealthWeights) -> HealthScore {
    let reservation = unit(metrics.reservation_success_rate);
    let uptime = ratio(
        metrics.uptime.as_secs_f64(),
        weights.uptime_saturation.as_secs_f64(),
    );
    let connections = ratio(
        f64::from(metrics.active_relay_connections),
        f64::from(weights.connection_saturation),
    );
    let hole_punch = unit(metrics.hole_punch_success_rate);

    let parts = [
        (weight(weights.reservation), reservation),
        (weight(weights.uptime), uptime),
        (weight(weights.connections), connections),
        (weight(weights.hole_punch), hole_punch),
    ];

    let total: f64 = parts.iter().map(|(w, _)| w).sum();
    if total <= 0.0 {
        return HealthScore::MIN;
    }

    let raw = parts.iter().map(|(w, v)| w * v).sum::<f64>() / total;
    HealthScore::new(raw as f32)
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn weight(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn ratio(value: f64, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return if value > 0.0 { 1.0 } else { 0.0 };
    }
    unit(value / saturation)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn perfect() -> RelayMetrics {
        RelayMetrics {
            reservation_success_rate: 1.0,
            uptime: Duration::from_secs(7200),
            active_relay_connections: 64,
            hole_punch_success_rate: 1.0,
        }
    }

    #[test]
    fn test_perfect_metrics_score_one() {
        let score = compute_health_score(&perfect(), &HealthWeights::default());
        assert!((score.value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_metrics_score_zero() {
        let score = compute_health_score(&RelayMetrics::default(), &HealthWeights::default());
        assert_eq!(score.value(), 0.0);
    }

    #[test]
    fn test_weighted_blend() {
        let metrics = RelayMetrics {
            reservation_success_rate: 1.0,
            uptime: Duration::from_secs(1800),
            active_relay_connections: 0,
            hole_punch_success_rate: 0.0,
        };
        // 0.35 * 1.0 + 0.25 * 0.5
        let score = compute_health_score(&metrics, &HealthWeights::default());
        assert!((score.value() - 0.475).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() {
        let metrics = RelayMetrics {
            reservation_success_rate: 12.0,
            uptime: Duration::from_secs(u64::MAX / 4),
            active_relay_connections: u32::MAX,
            hole_punch_success_rate: f64::INFINITY,
        };
        let score = compute_health_score(&metrics, &HealthWeights::default());
        assert!((0.0..=1.0).contains(&score.value()));
    }

    #[test]
    fn test_degenerate_weights() {
        let zero = HealthWeights {
            reservation: 0.0,
            uptime: -1.0,
            connections: f64::NAN,
            hole_punch: 0.0,
            ..HealthWeights::default()
        };
        assert_eq!(compute_health_score(&perfect(), &zero), HealthScore::MIN);

        let no_saturation = HealthWeights {
            uptime_saturation: Duration::ZERO,
            connection_saturation: 0,
            ..HealthWeights::default()
        };
        let score = compute_health_score(&perfect(), &no_saturation);
        assert!((score.value() - 1.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_score_always_in_range(
            reservation in proptest::num::f64::ANY,
            uptime_secs in any::<u64>(),
            connections in any::<u32>(),
            hole_punch in proptest::num::f64::ANY,
            w1 in -2.0f64..5.0,
            w2 in -2.0f64..5.0,
            w3 in -2.0f64..5.0,
            w4 in -2.0f64..5.0,
        ) {
            let metrics = RelayMetrics {
                reservation_success_rate: reservation,
                uptime: Duration::from_secs(uptime_secs),
                active_relay_connections: connections,
                hole_punch_success_rate: hole_punch,
            };
            let weights = HealthWeights {
                reservation: w1,
                uptime: w2,
                connections: w3,
                hole_punch: w4,
                ..HealthWeights::default()
            };
            let score = compute_health_score(&metrics, &weights).value();
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
