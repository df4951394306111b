//! Bootstrap Resolution — which peers a node dials on startup
//!
//! Override order (first source with at least one valid address wins, the
//! rest are ignored entirely):
//! 1. User settings (custom bootstrap nodes saved in the config file)
//! 2. `--bootstrap` command-line flags
//! 3. `BOOTSTRAP_NODES` environment variable (comma-separated multiaddrs)
//! 4. `bootstrap_nodes.json` (embedded in the binary)
//! 5. Hardcoded defaults

use crate::address::{self, PeerAddress};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable holding comma-separated bootstrap multiaddrs
pub const BOOTSTRAP_NODES_ENV: &str = "BOOTSTRAP_NODES";

/// Bootstrap node list compiled into the binary
const EMBEDDED_BOOTSTRAP_CONFIG: &str = include_str!("../bootstrap_nodes.json");

/// Bootstrap error types
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid bootstrap config: {0}")]
    InvalidConfig(String),
}

/// Where a bootstrap candidate list came from.
///
/// Declaration order is precedence order: `UserSettings` beats everything,
/// `Hardcoded` is the last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapSourceKind {
    UserSettings,
    CliFlag,
    EnvVar,
    ConfigFile,
    Hardcoded,
}

impl BootstrapSourceKind {
    /// All sources, highest precedence first
    pub const PRECEDENCE: [BootstrapSourceKind; 5] = [
        BootstrapSourceKind::UserSettings,
        BootstrapSourceKind::CliFlag,
        BootstrapSourceKind::EnvVar,
        BootstrapSourceKind::ConfigFile,
        BootstrapSourceKind::Hardcoded,
    ];

    /// 0 is the highest precedence
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            BootstrapSourceKind::UserSettings => "user settings",
            BootstrapSourceKind::CliFlag => "command-line flags",
            BootstrapSourceKind::EnvVar => BOOTSTRAP_NODES_ENV,
            BootstrapSourceKind::ConfigFile => "bootstrap_nodes.json",
            BootstrapSourceKind::Hardcoded => "hardcoded defaults",
        }
    }
}

impl fmt::Display for BootstrapSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An unvalidated bootstrap entry (alias + multiaddr text)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapCandidate {
    pub alias: String,
    pub multiaddr: String,
}

impl BootstrapCandidate {
    pub fn new(alias: impl Into<String>, multiaddr: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            multiaddr: multiaddr.into(),
        }
    }
}

/// Container for the bootstrap nodes JSON payload
#[derive(Debug, Deserialize)]
struct BootstrapNodesConfig {
    nodes: Vec<BootstrapCandidate>,
}

/// One link in the override chain.
///
/// Providers are only asked for candidates when every higher-precedence
/// provider came up empty.
pub trait BootstrapProvider: Send + Sync {
    fn kind(&self) -> BootstrapSourceKind;
    fn candidates(&self) -> Vec<BootstrapCandidate>;
}

/// A source whose candidates are already known
#[derive(Debug, Clone)]
pub struct BootstrapSource {
    kind: BootstrapSourceKind,
    candidates: Vec<BootstrapCandidate>,
}

impl BootstrapSource {
    pub fn new(kind: BootstrapSourceKind, candidates: Vec<BootstrapCandidate>) -> Self {
        Self { kind, candidates }
    }

    pub fn user_settings(candidates: Vec<BootstrapCandidate>) -> Self {
        Self::new(BootstrapSourceKind::UserSettings, candidates)
    }

    /// Repeated `--bootstrap` flags
    pub fn cli_flags(addrs: &[String]) -> Self {
        Self::new(BootstrapSourceKind::CliFlag, numbered("cli", addrs.iter()))
    }

    /// A comma-separated list, as found in `BOOTSTRAP_NODES`
    pub fn env_value(value: &str) -> Self {
        Self::new(BootstrapSourceKind::EnvVar, parse_comma_list(value))
    }

    /// A `{ "nodes": [ { "alias", "multiaddr" } ] }` payload
    pub fn config_payload(json: &str) -> Result<Self, BootstrapError> {
        let config: BootstrapNodesConfig = serde_json::from_str(json)
            .map_err(|e| BootstrapError::InvalidConfig(e.to_string()))?;
        Ok(Self::new(BootstrapSourceKind::ConfigFile, config.nodes))
    }

    pub fn hardcoded() -> Self {
        Self::new(BootstrapSourceKind::Hardcoded, hardcoded_bootstrap_nodes())
    }

    pub fn kind(&self) -> BootstrapSourceKind {
        self.kind
    }
}

impl BootstrapProvider for BootstrapSource {
    fn kind(&self) -> BootstrapSourceKind {
        self.kind
    }

    fn candidates(&self) -> Vec<BootstrapCandidate> {
        self.candidates.clone()
    }
}

/// Reads a comma-separated environment variable when asked
#[derive(Debug, Clone)]
pub struct EnvProvider {
    var: String,
}

impl EnvProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new(BOOTSTRAP_NODES_ENV)
    }
}

impl BootstrapProvider for EnvProvider {
    fn kind(&self) -> BootstrapSourceKind {
        BootstrapSourceKind::EnvVar
    }

    fn candidates(&self) -> Vec<BootstrapCandidate> {
        match std::env::var(&self.var) {
            Ok(value) => parse_comma_list(&value),
            Err(_) => Vec::new(),
        }
    }
}

/// Parses the embedded `bootstrap_nodes.json` when asked
#[derive(Debug, Clone)]
pub struct EmbeddedConfigProvider {
    payload: &'static str,
}

impl EmbeddedConfigProvider {
    pub fn new(payload: &'static str) -> Self {
        Self { payload }
    }
}

impl Default for EmbeddedConfigProvider {
    fn default() -> Self {
        Self::new(EMBEDDED_BOOTSTRAP_CONFIG)
    }
}

impl BootstrapProvider for EmbeddedConfigProvider {
    fn kind(&self) -> BootstrapSourceKind {
        BootstrapSourceKind::ConfigFile
    }

    fn candidates(&self) -> Vec<BootstrapCandidate> {
        match BootstrapSource::config_payload(self.payload) {
            Ok(source) => source.candidates,
            Err(e) => {
                warn!("Failed to load bootstrap_nodes.json: {}", e);
                Vec::new()
            }
        }
    }
}

/// A validated bootstrap node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapNode {
    pub alias: String,
    pub address: PeerAddress,
}

/// Outcome of running the override chain
#[derive(Debug, Clone, Default)]
pub struct BootstrapResolution {
    /// The winning source; `None` when every source was empty
    pub source: Option<BootstrapSourceKind>,
    pub nodes: Vec<BootstrapNode>,
}

impl BootstrapResolution {
    pub fn addresses(&self) -> Vec<PeerAddress> {
        self.nodes.iter().map(|n| n.address.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Chain-of-responsibility over bootstrap providers
#[derive(Default)]
pub struct BootstrapResolver {
    providers: Vec<Box<dyn BootstrapProvider>>,
}

impl BootstrapResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// The full five-source chain used by a running node
    pub fn standard(user_settings: Vec<BootstrapCandidate>, cli_flags: &[String]) -> Self {
        Self::new()
            .with_provider(BootstrapSource::user_settings(user_settings))
            .with_provider(BootstrapSource::cli_flags(cli_flags))
            .with_provider(EnvProvider::default())
            .with_provider(EmbeddedConfigProvider::default())
            .with_provider(BootstrapSource::hardcoded())
    }

    /// Add a provider. Registration order does not matter across kinds;
    /// providers of the same kind are asked in registration order.
    pub fn with_provider(mut self, provider: impl BootstrapProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Walk the chain in precedence order and return the first source that
    /// yields at least one valid address.
    pub fn resolve(&self) -> BootstrapResolution {
        let mut ordered: Vec<&dyn BootstrapProvider> =
            self.providers.iter().map(|p| p.as_ref()).collect();
        ordered.sort_by_key(|p| p.kind());

        for provider in ordered {
            let kind = provider.kind();
            let nodes = validate_candidates(kind, provider.candidates());

            if nodes.is_empty() {
                debug!("No usable bootstrap nodes from {}", kind);
                continue;
            }

            info!("Using {} bootstrap nodes from {}", nodes.len(), kind);
            return BootstrapResolution {
                source: Some(kind),
                nodes,
            };
        }

        warn!("No bootstrap nodes available from any source");
        BootstrapResolution::default()
    }
}

/// Resolve a fixed set of sources.
pub fn resolve(sources: Vec<BootstrapSource>) -> Vec<PeerAddress> {
    sources
        .into_iter()
        .fold(BootstrapResolver::new(), |resolver, source| {
            resolver.with_provider(source)
        })
        .resolve()
        .addresses()
}

fn validate_candidates(
    kind: BootstrapSourceKind,
    candidates: Vec<BootstrapCandidate>,
) -> Vec<BootstrapNode> {
    candidates
        .into_iter()
        .filter_map(|candidate| match address::validate(&candidate.multiaddr) {
            Ok(address) => Some(BootstrapNode {
                alias: candidate.alias,
                address,
            }),
            Err(e) => {
                warn!(
                    "Skipping bootstrap node {:?} from {}: {}",
                    candidate.alias, kind, e
                );
                None
            }
        })
        .collect()
}

fn parse_comma_list(value: &str) -> Vec<BootstrapCandidate> {
    let entries: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    numbered("bootstrap", entries.into_iter())
}

fn numbered<S: AsRef<str>>(
    prefix: &str,
    addrs: impl Iterator<Item = S>,
) -> Vec<BootstrapCandidate> {
    addrs
        .enumerate()
        .map(|(i, addr)| BootstrapCandidate::new(format!("{}-{}", prefix, i + 1), addr.as_ref()))
        .collect()
}

/// Hardcoded bootstrap nodes (last resort fallback)
pub fn hardcoded_bootstrap_nodes() -> Vec<BootstrapCandidate> {
    vec![
        BootstrapCandidate::new(
            "vincenzo-bootstrap",
            "/ip4/134.199.240.145/tcp/4001/p2p/12D3KooWFYTuQ2FY8tXRtFKfpXkTSipTF55mZkLntwtN1nHu83qE",
        ),
        BootstrapCandidate::new(
            "turtle-bootstrap-2",
            "/ip4/136.116.190.115/tcp/4001/p2p/12D3KooWETLNJUVLbkAbenbSPPdwN9ZLkBU3TLfyAeEUW2dsVptr",
        ),
        BootstrapCandidate::new(
            "whale-bootstrap-3",
            "/ip4/130.245.173.105/tcp/4001/p2p/12D3KooWGFRvjXFBoU9y6xdteqP1kzctAXrYPoaDGmTGRHybZ6rp",
        ),
    ]
}

// ============================================================================
// TESTS
// ============================================================================
