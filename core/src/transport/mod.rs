// Transport module — libp2p swarm and networking

pub mod behaviour;
pub mod kad_store;
pub mod signals;
pub mod swarm;

pub use behaviour::RelayMeshBehaviour;
pub use kad_store::KademliaStore;
pub use signals::SignalBoard;
pub use swarm::{start_swarm, SwarmCommand, SwarmHandle};
