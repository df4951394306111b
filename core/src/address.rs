//! Peer address validation
//!
//! Bootstrap entries and relay records carry addresses in the canonical
//! `/ipN/ADDR/tcp/PORT/p2p/PEER_ID` form. Anything else is not constructible
//! as a [`PeerAddress`]; callers drop the entry and move on.

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Address validation error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,
    #[error("Malformed address {0:?}: {1}")]
    Malformed(String, String),
    #[error("Unsupported address {0:?}: expected /ipN/ADDR/tcp/PORT/p2p/PEER_ID")]
    UnsupportedShape(String),
    #[error("Address {address:?} names peer {found}, expected {expected}")]
    PeerMismatch {
        address: String,
        expected: PeerId,
        found: PeerId,
    },
}

/// A validated, dialable peer address.
///
/// Equality and ordering follow the multiaddr bytes, so two spellings of the
/// same address collapse to one entry in a set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    multiaddr: Multiaddr,
    ip: IpAddr,
    port: u16,
    peer_id: PeerId,
}

/// Validate a textual peer address.
pub fn validate(text: &str) -> Result<PeerAddress, AddressError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    let multiaddr: Multiaddr = trimmed
        .parse()
        .map_err(|e: libp2p::multiaddr::Error| {
            AddressError::Malformed(trimmed.to_string(), e.to_string())
        })?;

    PeerAddress::from_multiaddr(multiaddr)
}

impl PeerAddress {
    /// Validate an already-parsed multiaddr.
    pub fn from_multiaddr(multiaddr: Multiaddr) -> Result<Self, AddressError> {
        let shape_error = || AddressError::UnsupportedShape(multiaddr.to_string());

        let mut parts = multiaddr.iter();
        let ip = match parts.next() {
            Some(Protocol::Ip4(ip)) => IpAddr::V4(ip),
            Some(Protocol::Ip6(ip)) => IpAddr::V6(ip),
            _ => return Err(shape_error()),
        };
        let port = match parts.next() {
            Some(Protocol::Tcp(port)) if port != 0 => port,
            _ => return Err(shape_error()),
        };
        let peer_id = match parts.next() {
            Some(Protocol::P2p(peer_id)) => peer_id,
            _ => return Err(shape_error()),
        };
        if parts.next().is_some() {
            return Err(shape_error());
        }

        Ok(Self {
            multiaddr,
            ip,
            port,
            peer_id,
        })
    }

    /// Build a peer address from a listen address and the local peer id.
    ///
    /// Listen addresses usually lack the `/p2p/` suffix; it is appended here.
    /// A suffix naming a different peer is rejected.
    pub fn with_peer(listen_addr: &Multiaddr, peer_id: PeerId) -> Result<Self, AddressError> {
        match listen_addr.iter().last() {
            Some(Protocol::P2p(found)) if found != peer_id => Err(AddressError::PeerMismatch {
                address: listen_addr.to_string(),
                expected: peer_id,
                found,
            }),
            Some(Protocol::P2p(_)) => Self::from_multiaddr(listen_addr.clone()),
            _ => Self::from_multiaddr(listen_addr.clone().with(Protocol::P2p(peer_id))),
        }
    }

    pub fn multiaddr(&self) -> &Multiaddr {
        &self.multiaddr
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}

/// True when the multiaddr starts with a public (non-private, non-loopback)
/// IP address. DNS and other non-IP addresses are not considered public.
pub fn is_publicly_routable(addr: &Multiaddr) -> bool {
    match addr.iter().next() {
        Some(Protocol::Ip4(ip)) => is_public_v4(ip),
        Some(Protocol::Ip6(ip)) => is_public_v6(ip),
        _ => false,
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    // 100.64.0.0/10 is carrier-grade NAT space
    let cgnat = ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64;
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || cgnat)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public_v4(mapped);
    }
    !(ip.is_loopback() || ip.is_unspecified() || unique_local || link_local)
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.multiaddr)
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)
    }
}

impl From<PeerAddress> for String {
    fn from(addr: PeerAddress) -> Self {
        addr.multiaddr.to_string()
    }
}

impl PartialEq for PeerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.multiaddr.as_ref() == other.multiaddr.as_ref()
    }
}

impl Eq for PeerAddress {}

impl Hash for PeerAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.multiaddr.as_ref().hash(state);
    }
}

impl PartialOrd for PeerAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PeerAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.multiaddr.as_ref().cmp(other.multiaddr.as_ref())
    }
}

// ============================================================================
// TESTS
// ============================================================================
