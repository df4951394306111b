// RelayMesh Core — relay discovery and bootstrap resolution
//
// A node finds its first peers through an ordered chain of bootstrap
// sources, and nodes that can serve as relays advertise themselves in a
// record set shared through the DHT.

pub mod address;
pub mod bootstrap;
pub mod clock;
pub mod relay;
pub mod store;
pub mod transport;

pub use address::{is_publicly_routable, validate, AddressError, PeerAddress};
pub use bootstrap::{
    hardcoded_bootstrap_nodes, resolve, BootstrapCandidate, BootstrapError, BootstrapNode,
    BootstrapProvider, BootstrapResolution, BootstrapResolver, BootstrapSource,
    BootstrapSourceKind,
};
pub use clock::{unix_now, Clock, ManualClock, SystemClock};
pub use relay::{
    compute_health_score, AutoRegistrar, HealthScore, HealthWeights, NodeSignals,
    ReachabilitySignal, RegistrarConfig, RegistryView, RelayMetrics, RelayRecord,
    RelayRegistry, TickOutcome, STALE_AFTER_SECS,
};
pub use store::{DistributedStore, MemoryStore, RelayStoreAdapter, StoreError};
pub use transport::{start_swarm, KademliaStore, SignalBoard, SwarmHandle};
