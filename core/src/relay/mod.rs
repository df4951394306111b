//! Relay discovery
//!
//! Nodes that volunteer as relays publish themselves into a shared record set
//! kept in the DHT. Every node caches that set locally and serves it to
//! clients that need a relay.

pub mod health;
pub mod record;
pub mod registrar;
pub mod registry;
pub mod view;

pub use health::{compute_health_score, HealthWeights, RelayMetrics};
pub use record::{HealthScore, RelayRecord, STALE_AFTER_SECS};
pub use registrar::{
    AutoRegistrar, GateClosed, NodeSignals, ReachabilitySignal, RegistrarConfig,
    RegistrationState, TickOutcome, MIN_REGISTRATION_INTERVAL, RETRY_BACKOFF,
};
pub use registry::RelayRegistry;
pub use view::RegistryView;
