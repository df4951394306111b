// Combined NetworkBehaviour for a relaymesh node
//
// - kademlia: DHT holding the shared relay record set
// - identify: exchange listen addresses (feeds Kademlia and AutoNAT)
// - autonat: public reachability detection
// - relay: circuit relay server, only when this node volunteers as a relay
// - relay_client + dcutr: reach NATed peers over circuits, then upgrade to a
//   direct connection by hole punching

use libp2p::{
    autonat, dcutr, identify, kad, relay,
    swarm::{behaviour::toggle::Toggle, NetworkBehaviour},
};

/// Identify protocol version advertised by relaymesh nodes
pub const IDENTIFY_PROTOCOL: &str = "/relaymesh/id/1.0.0";

/// The relaymesh network behaviour combining all protocols.
#[derive(NetworkBehaviour)]
pub struct RelayMeshBehaviour {
    /// DHT for peer routing and the relay record set
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    /// Peer identification
    pub identify: identify::Behaviour,
    /// Reachability probing
    pub autonat: autonat::Behaviour,
    /// Circuit relay server (disabled unless relay-server mode is on)
    pub relay: Toggle<relay::Behaviour>,
    /// Circuit relay client, transport half wired in by the swarm builder
    pub relay_client: relay::client::Behaviour,
    /// Direct connection upgrade through relay
    pub dcutr: dcutr::Behaviour,
}

impl RelayMeshBehaviour {
    /// Create a new behaviour with the given keypair
    pub fn new(
        keypair: &libp2p::identity::Keypair,
        relay_client: relay::client::Behaviour,
        enable_relay_server: bool,
    ) -> Self {
        let peer_id = keypair.public().to_peer_id();

        let kademlia = kad::Behaviour::new(peer_id, kad::store::MemoryStore::new(peer_id));

        let identify = identify::Behaviour::new(
            identify::Config::new(IDENTIFY_PROTOCOL.to_string(), keypair.public())
                .with_push_listen_addr_updates(true),
        );

        let autonat = autonat::Behaviour::new(peer_id, autonat::Config::default());

        let relay = enable_relay_server
            .then(|| relay::Behaviour::new(peer_id, relay::Config::default()));

        Self {
            kademlia,
            identify,
            autonat,
            relay: Toggle::from(relay),
            relay_client,
            dcutr: dcutr::Behaviour::new(peer_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_behaviour_builds_with_relay_client() {
        let swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default(),
                libp2p::noise::Config::new,
                libp2p::yamux::Config::default,
            )
            .unwrap()
            .with_relay_client(libp2p::noise::Config::new, libp2p::yamux::Config::default)
            .unwrap()
            .with_behaviour(|key, relay_client| RelayMeshBehaviour::new(key, relay_client, true))
            .unwrap()
            .build();

        assert!(swarm.behaviour().relay.is_enabled());
    }
}
