// Configuration management for the relaymesh CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/relaymesh/config.json
// - Linux: ~/.config/relaymesh/config.json
// - Windows: %APPDATA%\relaymesh\config.json

use anyhow::{Context, Result};
use relaymesh_core::relay::MIN_REGISTRATION_INTERVAL;
use relaymesh_core::BootstrapCandidate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment override for the read endpoint base URL
pub const BOOTSTRAP_URL_ENV: &str = "RELAYMESH_BOOTSTRAP_URL";

/// Read endpoint base URL when neither env nor settings provide one
pub const DEFAULT_BOOTSTRAP_URL: &str = "http://127.0.0.1:9876";

pub const DEFAULT_API_PORT: u16 = 9876;

const MIN_STORE_TIMEOUT_SECS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// User-configured bootstrap nodes (highest precedence)
    pub bootstrap_nodes: Vec<BootstrapCandidate>,

    /// TCP port for the libp2p listener
    pub listen_port: u16,

    /// Volunteer as a circuit relay and self-register when reachable
    pub enable_relay_server: bool,

    /// Friendly name published with our relay record
    pub relay_alias: Option<String>,

    /// Relay registry settings
    pub registry: RegistrySettings,

    /// Base URL of the relay read endpoint used by `relaymesh relays`
    pub bootstrap_http_url: Option<String>,

    /// Port of the local HTTP read endpoint
    pub api_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Whether this deployment has a relay registry at all
    pub enabled: bool,

    /// Bound on every distributed store call
    pub store_timeout_secs: u64,

    /// Seconds between registrar ticks
    pub registration_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap_nodes: Vec::new(),
            listen_port: 4001,
            enable_relay_server: false,
            relay_alias: None,
            registry: RegistrySettings::default(),
            bootstrap_http_url: None,
            api_port: DEFAULT_API_PORT,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            store_timeout_secs: 5,
            registration_interval_secs: MIN_REGISTRATION_INTERVAL.as_secs(),
        }
    }
}

impl RegistrySettings {
    /// Raise hand-edited values to the minimums `Config::set` enforces
    fn enforce_minimums(&mut self) {
        let min_interval = MIN_REGISTRATION_INTERVAL.as_secs();
        if self.registration_interval_secs < min_interval {
            tracing::warn!(
                "registry.registration_interval_secs = {} is below {}, using {}",
                self.registration_interval_secs,
                min_interval,
                min_interval
            );
            self.registration_interval_secs = min_interval;
        }
        if self.store_timeout_secs < MIN_STORE_TIMEOUT_SECS {
            tracing::warn!(
                "registry.store_timeout_secs = {} is below {}, using {}",
                self.store_timeout_secs,
                MIN_STORE_TIMEOUT_SECS,
                MIN_STORE_TIMEOUT_SECS
            );
            self.store_timeout_secs = MIN_STORE_TIMEOUT_SECS;
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("relaymesh");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("relaymesh");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load config from `path`, or create it with defaults if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let mut config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config.registry.enforce_minimums();
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Add a bootstrap node, replacing any entry with the same alias.
    ///
    /// The address must pass the same validation the resolver applies.
    pub fn add_bootstrap_node(&mut self, alias: &str, multiaddr: &str) -> Result<()> {
        let address = relaymesh_core::validate(multiaddr)
            .with_context(|| format!("Invalid bootstrap address: {}", multiaddr))?;

        self.bootstrap_nodes.retain(|n| n.alias != alias);
        self.bootstrap_nodes
            .push(BootstrapCandidate::new(alias, address.to_string()));
        Ok(())
    }

    /// Remove bootstrap nodes matching `alias_or_addr`. Returns whether
    /// anything was removed.
    pub fn remove_bootstrap_node(&mut self, alias_or_addr: &str) -> bool {
        let before = self.bootstrap_nodes.len();
        self.bootstrap_nodes
            .retain(|n| n.alias != alias_or_addr && n.multiaddr != alias_or_addr);
        self.bootstrap_nodes.len() != before
    }

    /// Set a config value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "listen_port" => {
                self.listen_port = value.parse().context("Invalid port number")?;
            }
            "enable_relay_server" => {
                self.enable_relay_server = value.parse().context("Invalid boolean value")?;
            }
            "relay_alias" => {
                self.relay_alias = non_empty(value);
            }
            "registry.enabled" => {
                self.registry.enabled = value.parse().context("Invalid boolean value")?;
            }
            "registry.store_timeout_secs" => {
                let secs: u64 = value.parse().context("Invalid number")?;
                if secs < MIN_STORE_TIMEOUT_SECS {
                    anyhow::bail!("Store timeout must be at least {}s", MIN_STORE_TIMEOUT_SECS);
                }
                self.registry.store_timeout_secs = secs;
            }
            "registry.registration_interval_secs" => {
                let secs: u64 = value.parse().context("Invalid number")?;
                if secs < MIN_REGISTRATION_INTERVAL.as_secs() {
                    anyhow::bail!(
                        "Registration interval must be at least {}s",
                        MIN_REGISTRATION_INTERVAL.as_secs()
                    );
                }
                self.registry.registration_interval_secs = secs;
            }
            "bootstrap_http_url" => {
                self.bootstrap_http_url = non_empty(value);
            }
            "api_port" => {
                self.api_port = value.parse().context("Invalid port number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "listen_port" => Some(self.listen_port.to_string()),
            "enable_relay_server" => Some(self.enable_relay_server.to_string()),
            "relay_alias" => self.relay_alias.clone(),
            "registry.enabled" => Some(self.registry.enabled.to_string()),
            "registry.store_timeout_secs" => Some(self.registry.store_timeout_secs.to_string()),
            "registry.registration_interval_secs" => {
                Some(self.registry.registration_interval_secs.to_string())
            }
            "bootstrap_http_url" => self.bootstrap_http_url.clone(),
            "api_port" => Some(self.api_port.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("listen_port".to_string(), self.listen_port.to_string()),
            ("enable_relay_server".to_string(), self.enable_relay_server.to_string()),
            (
                "relay_alias".to_string(),
                self.relay_alias.clone().unwrap_or_else(|| "(none)".to_string()),
            ),
            ("registry.enabled".to_string(), self.registry.enabled.to_string()),
            (
                "registry.store_timeout_secs".to_string(),
                format!("{}s", self.registry.store_timeout_secs),
            ),
            (
                "registry.registration_interval_secs".to_string(),
                format!("{}s", self.registry.registration_interval_secs),
            ),
            (
                "bootstrap_http_url".to_string(),
                self.bootstrap_http_url
                    .clone()
                    .unwrap_or_else(|| "(default)".to_string()),
            ),
            ("api_port".to_string(), self.api_port.to_string()),
            ("bootstrap_nodes".to_string(), self.bootstrap_nodes.len().to_string()),
        ]
    }

    /// Base URL of the relay read endpoint: env, then settings, then default
    pub fn bootstrap_url(&self) -> String {
        resolve_bootstrap_url(
            std::env::var(BOOTSTRAP_URL_ENV).ok(),
            self.bootstrap_http_url.as_deref(),
        )
    }
}

pub fn resolve_bootstrap_url(env_value: Option<String>, settings: Option<&str>) -> String {
    env_value
        .and_then(|v| non_empty(&v))
        .or_else(|| settings.and_then(non_empty))
        .unwrap_or_else(|| DEFAULT_BOOTSTRAP_URL.to_string())
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
