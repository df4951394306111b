// libp2p swarm setup — the running network node
//
// This creates and manages the libp2p Swarm with:
// - TCP transport with DNS resolution
// - Noise encryption
// - Yamux multiplexing
// - All behaviours from behaviour.rs
//
// The swarm is owned by a single tokio task. Everything else talks to it
// through a SwarmHandle and observes it through the SignalBoard.

use super::behaviour::{RelayMeshBehaviour, RelayMeshBehaviourEvent};
use super::signals::SignalBoard;
use anyhow::Result;
use futures::StreamExt;
use libp2p::{autonat, identify, identity::Keypair, kad, relay, swarm::SwarmEvent, Multiaddr, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Commands that can be sent to the swarm task
#[derive(Debug)]
pub enum SwarmCommand {
    /// Dial a peer at a specific address
    Dial {
        addr: Multiaddr,
        reply: mpsc::Sender<Result<(), String>>,
    },
    /// Register a bootstrap peer with Kademlia and AutoNAT, then dial it
    ConnectBootstrap {
        peer_id: PeerId,
        addr: Multiaddr,
        reply: mpsc::Sender<Result<(), String>>,
    },
    /// Get list of connected peers
    GetPeers { reply: mpsc::Sender<Vec<PeerId>> },
    /// Look up a DHT record, first value found wins
    GetRecord {
        key: String,
        reply: mpsc::Sender<Result<Option<Vec<u8>>, String>>,
    },
    /// Store a DHT record locally and replicate it
    PutRecord {
        key: String,
        value: Vec<u8>,
        reply: mpsc::Sender<Result<(), String>>,
    },
    /// Shutdown the swarm
    Shutdown,
}

enum PendingQuery {
    Get(mpsc::Sender<Result<Option<Vec<u8>>, String>>),
    Put(mpsc::Sender<Result<(), String>>),
}

/// Handle to communicate with the running swarm task
#[derive(Clone)]
pub struct SwarmHandle {
    local_peer_id: PeerId,
    command_tx: mpsc::Sender<SwarmCommand>,
}

impl SwarmHandle {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Dial a peer at a multiaddress
    pub async fn dial(&self, addr: Multiaddr) -> Result<()> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(SwarmCommand::Dial {
                addr,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Swarm task not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from swarm"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    /// Connect to a bootstrap node, seeding the DHT routing table with it
    pub async fn connect_bootstrap(&self, peer_id: PeerId, addr: Multiaddr) -> Result<()> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(SwarmCommand::ConnectBootstrap {
                peer_id,
                addr,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Swarm task not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from swarm"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    /// Get connected peers
    pub async fn get_peers(&self) -> Result<Vec<PeerId>> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(SwarmCommand::GetPeers { reply: reply_tx })
            .await
            .map_err(|_| anyhow::anyhow!("Swarm task not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from swarm"))
    }

    /// Fetch the value stored under `key`, `None` if the DHT has no record
    pub async fn get_record(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(SwarmCommand::GetRecord {
                key: key.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Swarm task not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from swarm"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    /// Replace the value stored under `key`
    pub async fn put_record(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(SwarmCommand::PutRecord {
                key: key.to_string(),
                value,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Swarm task not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from swarm"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    /// Shut down the swarm
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(SwarmCommand::Shutdown)
            .await
            .map_err(|_| anyhow::anyhow!("Swarm task not running"))
    }
}

/// Build and start the libp2p swarm, returning a handle for communication.
///
/// This spawns a tokio task that runs the swarm event loop. Reachability,
/// listen addresses and relay activity are reported into `signals`.
pub async fn start_swarm(
    keypair: Keypair,
    listen_addr: Multiaddr,
    enable_relay_server: bool,
    signals: Arc<SignalBoard>,
) -> Result<SwarmHandle> {
    let local_peer_id = keypair.public().to_peer_id();

    let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            libp2p::tcp::Config::default(),
            libp2p::noise::Config::new,
            libp2p::yamux::Config::default,
        )?
        .with_dns()?
        .with_relay_client(libp2p::noise::Config::new, libp2p::yamux::Config::default)?
        .with_behaviour(|key, relay_client| {
            RelayMeshBehaviour::new(key, relay_client, enable_relay_server)
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(300)))
        .build();

    swarm.listen_on(listen_addr)?;

    // Server mode so other nodes can query our copy of the relay set
    swarm
        .behaviour_mut()
        .kademlia
        .set_mode(Some(kad::Mode::Server));

    let (command_tx, mut command_rx) = mpsc::channel::<SwarmCommand>(256);
    let handle = SwarmHandle {
        local_peer_id,
        command_tx,
    };

    let mut pending_queries: HashMap<kad::QueryId, PendingQuery> = HashMap::new();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(RelayMeshBehaviourEvent::Kademlia(
                            kad::Event::OutboundQueryProgressed { id, result, .. }
                        )) => {
                            match result {
                                kad::QueryResult::GetRecord(Ok(kad::GetRecordOk::FoundRecord(found))) => {
                                    if let Some(PendingQuery::Get(reply)) = pending_queries.remove(&id) {
                                        let _ = reply.send(Ok(Some(found.record.value))).await;
                                        if let Some(mut query) = swarm.behaviour_mut().kademlia.query_mut(&id) {
                                            query.finish();
                                        }
                                    }
                                }
                                kad::QueryResult::GetRecord(Ok(kad::GetRecordOk::FinishedWithNoAdditionalRecord { .. })) => {
                                    if let Some(PendingQuery::Get(reply)) = pending_queries.remove(&id) {
                                        let _ = reply.send(Ok(None)).await;
                                    }
                                }
                                kad::QueryResult::GetRecord(Err(e)) => {
                                    if let Some(PendingQuery::Get(reply)) = pending_queries.remove(&id) {
                                        let outcome = match e {
                                            kad::GetRecordError::NotFound { .. } => Ok(None),
                                            other => Err(other.to_string()),
                                        };
                                        let _ = reply.send(outcome).await;
                                    }
                                }
                                kad::QueryResult::PutRecord(outcome) => {
                                    if let Some(PendingQuery::Put(reply)) = pending_queries.remove(&id) {
                                        let _ = reply.send(outcome.map(|_| ()).map_err(|e| e.to_string())).await;
                                    }
                                }
                                kad::QueryResult::Bootstrap(outcome) => {
                                    tracing::debug!("Kademlia bootstrap step: {:?}", outcome);
                                }
                                _ => {}
                            }
                        }

                        SwarmEvent::Behaviour(RelayMeshBehaviourEvent::Identify(
                            identify::Event::Received { peer_id, info, .. }
                        )) => {
                            tracing::debug!("Identified peer {} with {} addresses", peer_id, info.listen_addrs.len());
                            for addr in info.listen_addrs {
                                swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                            }
                        }

                        SwarmEvent::Behaviour(RelayMeshBehaviourEvent::Autonat(
                            autonat::Event::StatusChanged { old, new }
                        )) => {
                            tracing::info!("Reachability changed: {:?} -> {:?}", old, new);
                            signals.set_publicly_reachable(matches!(new, autonat::NatStatus::Public(_)));
                        }

                        SwarmEvent::Behaviour(RelayMeshBehaviourEvent::Relay(event)) => {
                            match event {
                                relay::Event::ReservationReqAccepted { src_peer_id, .. } => {
                                    tracing::debug!("Accepted relay reservation from {}", src_peer_id);
                                    signals.record_reservation(true);
                                }
                                relay::Event::ReservationReqDenied { src_peer_id, .. } => {
                                    tracing::debug!("Denied relay reservation from {}", src_peer_id);
                                    signals.record_reservation(false);
                                }
                                relay::Event::CircuitReqAccepted { src_peer_id, dst_peer_id, .. } => {
                                    tracing::debug!("Relaying circuit {} -> {}", src_peer_id, dst_peer_id);
                                    signals.circuit_opened();
                                }
                                relay::Event::CircuitClosed { .. } => signals.circuit_closed(),
                                _ => {}
                            }
                        }

                        SwarmEvent::Behaviour(RelayMeshBehaviourEvent::Dcutr(event)) => {
                            match &event.result {
                                Ok(_) => tracing::info!("Hole punch to {} succeeded", event.remote_peer_id),
                                Err(e) => tracing::debug!("Hole punch to {} failed: {}", event.remote_peer_id, e),
                            }
                            signals.observe_hole_punch(&event);
                        }

                        SwarmEvent::NewListenAddr { address, .. } => {
                            tracing::info!("Listening on {}", address);
                            signals.add_listen_addr(address);
                        }

                        SwarmEvent::ExpiredListenAddr { address, .. } => {
                            signals.remove_listen_addr(&address);
                        }

                        SwarmEvent::ExternalAddrConfirmed { address } => {
                            tracing::info!("External address confirmed: {}", address);
                            signals.add_external_addr(address);
                        }

                        SwarmEvent::ExternalAddrExpired { address } => {
                            signals.remove_external_addr(&address);
                        }

                        SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                            tracing::info!("Connected to {} via {}", peer_id, endpoint.get_remote_address());
                            signals.connection_established();
                        }

                        SwarmEvent::ConnectionClosed { peer_id, .. } => {
                            tracing::info!("Disconnected from {}", peer_id);
                            signals.connection_closed();
                        }

                        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                            tracing::warn!("Dial to {:?} failed: {}", peer_id, error);
                        }

                        _ => {}
                    }
                }

                Some(command) = command_rx.recv() => {
                    match command {
                        SwarmCommand::Dial { addr, reply } => {
                            let _ = reply.send(swarm.dial(addr).map_err(|e| e.to_string())).await;
                        }

                        SwarmCommand::ConnectBootstrap { peer_id, addr, reply } => {
                            let behaviour = swarm.behaviour_mut();
                            behaviour.kademlia.add_address(&peer_id, addr.clone());
                            behaviour.autonat.add_server(peer_id, Some(addr.clone()));
                            if let Err(e) = behaviour.kademlia.bootstrap() {
                                tracing::debug!("Kademlia bootstrap not started: {}", e);
                            }
                            let _ = reply.send(swarm.dial(addr).map_err(|e| e.to_string())).await;
                        }

                        SwarmCommand::GetPeers { reply } => {
                            let peers: Vec<PeerId> = swarm.connected_peers().cloned().collect();
                            let _ = reply.send(peers).await;
                        }

                        SwarmCommand::GetRecord { key, reply } => {
                            let id = swarm.behaviour_mut().kademlia.get_record(kad::RecordKey::new(&key));
                            pending_queries.insert(id, PendingQuery::Get(reply));
                        }

                        SwarmCommand::PutRecord { key, value, reply } => {
                            let record = kad::Record::new(kad::RecordKey::new(&key), value);
                            match swarm.behaviour_mut().kademlia.put_record(record, kad::Quorum::One) {
                                Ok(id) => {
                                    pending_queries.insert(id, PendingQuery::Put(reply));
                                }
                                Err(e) => {
                                    let _ = reply.send(Err(e.to_string())).await;
                                }
                            }
                        }

                        SwarmCommand::Shutdown => {
                            tracing::info!("Swarm shutting down");
                            break;
                        }
                    }
                }
            }
        }
    });

    Ok(handle)
}
