// relaymesh — relay discovery node and CLI
//
// Cross-platform (macOS, Linux, Windows) command-line interface for running a
// relaymesh node and inspecting bootstrap and relay state.

mod api;
mod config;
mod identity;
mod server;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use relaymesh_core::{
    start_swarm, AutoRegistrar, BootstrapResolution, BootstrapResolver, Clock, KademliaStore,
    RegistrarConfig, RegistryView, RelayRecord, RelayRegistry, RelayStoreAdapter, SignalBoard,
    SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "relaymesh")]
#[command(about = "RelayMesh — relay discovery for peer-to-peer nodes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node
    Start(StartArgs),
    /// Show which bootstrap nodes a node would dial
    Bootstrap {
        /// Bootstrap multiaddr (repeatable)
        #[arg(long = "bootstrap", value_name = "ADDR")]
        bootstrap: Vec<String>,
    },
    /// List live relays known to a running node
    Relays {
        /// Base URL of the node's HTTP endpoint
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct StartArgs {
    /// TCP port for the libp2p listener
    #[arg(short, long)]
    port: Option<u16>,
    /// Bootstrap multiaddr (repeatable)
    #[arg(long = "bootstrap", value_name = "ADDR")]
    bootstrap: Vec<String>,
    /// Volunteer as a circuit relay
    #[arg(long)]
    relay_server: bool,
    /// Friendly name published with our relay record
    #[arg(long)]
    alias: Option<String>,
    /// Port for the HTTP read endpoint
    #[arg(long)]
    api_port: Option<u16>,
    /// Also write daily-rotated logs into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
    Bootstrap {
        #[command(subcommand)]
        action: BootstrapAction,
    },
}

#[derive(Subcommand)]
enum BootstrapAction {
    Add { alias: String, multiaddr: String },
    Remove { alias_or_multiaddr: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => {
            let _guard = init_tracing("info", args.log_dir.as_deref())?;
            cmd_start(args).await
        }
        Commands::Bootstrap { bootstrap } => {
            init_tracing("warn", None)?;
            cmd_bootstrap(bootstrap)
        }
        Commands::Relays { url } => {
            init_tracing("warn", None)?;
            cmd_relays(url).await
        }
        Commands::Config { action } => {
            init_tracing("warn", None)?;
            cmd_config(action)
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
fn init_tracing(default_level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::daily(dir, "relaymesh.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

async fn cmd_start(args: StartArgs) -> Result<()> {
    let config = config::Config::load()?;
    let port = args.port.unwrap_or(config.listen_port);
    let api_port = args.api_port.unwrap_or(config.api_port);
    let enable_relay_server = args.relay_server || config.enable_relay_server;

    println!("{}", "RelayMesh — Starting...".bold());
    println!();

    let keypair = identity::load_or_create_keypair(
        &config::Config::data_dir()?.join(identity::KEY_FILE),
    )?;
    let local_peer_id = keypair.public().to_peer_id();
    println!("{} Peer ID: {}", "✓".green(), local_peer_id.to_string().bright_cyan());

    let resolution =
        BootstrapResolver::standard(config.bootstrap_nodes.clone(), &args.bootstrap).resolve();
    print_resolution(&resolution);

    let signals = Arc::new(SignalBoard::new());
    let listen_addr: libp2p::Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", port).parse()?;
    let swarm = start_swarm(keypair, listen_addr, enable_relay_server, signals.clone())
        .await
        .context("Failed to start network")?;
    println!("{} Network started on port {}", "✓".green(), port);

    for node in &resolution.nodes {
        let addr = node.address.multiaddr().clone();
        if let Err(e) = swarm.connect_bootstrap(node.address.peer_id(), addr).await {
            tracing::warn!("Could not dial bootstrap node {}: {}", node.alias, e);
        }
    }

    let registry = RelayRegistry::new();
    let store = config.registry.enabled.then(|| {
        RelayStoreAdapter::new(Arc::new(KademliaStore::new(swarm.clone())))
            .with_timeout(Duration::from_secs(config.registry.store_timeout_secs))
    });
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registrar = Arc::new(AutoRegistrar::new(
        local_peer_id,
        RegistrarConfig {
            enable_relay_server,
            alias: args.alias.or_else(|| config.relay_alias.clone()),
            ..RegistrarConfig::default()
        },
        registry.clone(),
        store.clone(),
        signals,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let registrar_task = tokio::spawn(registrar.run(
        Duration::from_secs(config.registry.registration_interval_secs),
        clock.clone(),
        shutdown_rx,
    ));

    let view = RegistryView::new(registry.clone(), store);
    let api_task = server::start(
        api_port,
        Arc::new(server::ApiContext {
            local_peer_id: local_peer_id.to_string(),
            view,
            bootstrap: resolution,
            clock,
            start_time: Instant::now(),
        }),
    )
    .await?;
    println!("{} Relay API on http://127.0.0.1:{}/api/relays", "✓".green(), api_port);

    if enable_relay_server {
        println!("{} Relay server enabled", "✓".green());
    }
    if !config.registry.enabled {
        println!("  {}", "Relay registry disabled, self-registration off".dimmed());
    }
    println!();
    println!("Press {} to stop.", "Ctrl-C".bright_yellow());

    let status_swarm = swarm.clone();
    let status_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            match status_swarm.get_peers().await {
                Ok(peers) => tracing::info!(
                    "Connected peers: {}, cached relays: {}",
                    peers.len(),
                    registry.len()
                ),
                Err(_) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!();
    println!("Shutting down...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = registrar_task.await {
        tracing::error!("Relay auto-registrar task failed: {}", e);
    }
    status_task.abort();
    api_task.abort();
    let _ = swarm.shutdown().await;

    Ok(())
}

fn cmd_bootstrap(cli_flags: Vec<String>) -> Result<()> {
    let config = config::Config::load()?;
    let resolution = BootstrapResolver::standard(config.bootstrap_nodes, &cli_flags).resolve();
    print_resolution(&resolution);
    Ok(())
}

async fn cmd_relays(url: Option<String>) -> Result<()> {
    let base_url = match url {
        Some(url) => url,
        None => config::Config::load()?.bootstrap_url(),
    };

    let relays = api::fetch_relays(&base_url).await?;

    println!("{} ({})", "Live Relays".bold(), base_url.dimmed());
    if relays.is_empty() {
        println!("  {}", "(none)".dimmed());
        return Ok(());
    }

    for (i, relay) in relays.iter().enumerate() {
        print_relay(i + 1, relay);
    }

    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown or unset config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<38} {}", key.bright_cyan(), value);
            }

            println!();
            print_bootstrap_settings(&config);
        }

        ConfigAction::Bootstrap { action } => match action {
            BootstrapAction::Add { alias, multiaddr } => {
                config.add_bootstrap_node(&alias, &multiaddr)?;
                config.save()?;
                println!("{} Added bootstrap node {}: {}", "✓".green(), alias, multiaddr);
            }

            BootstrapAction::Remove { alias_or_multiaddr } => {
                if config.remove_bootstrap_node(&alias_or_multiaddr) {
                    config.save()?;
                    println!("{} Removed bootstrap node", "✓".green());
                } else {
                    anyhow::bail!("No bootstrap node matches {}", alias_or_multiaddr);
                }
            }

            BootstrapAction::List => print_bootstrap_settings(&config),
        },
    }

    Ok(())
}

fn print_resolution(resolution: &BootstrapResolution) {
    match resolution.source {
        Some(source) => {
            println!(
                "{} {} bootstrap nodes from {}",
                "✓".green(),
                resolution.nodes.len(),
                source.label().bright_cyan()
            );
            for node in &resolution.nodes {
                println!("  • {:<20} {}", node.alias, node.address.to_string().dimmed());
            }
        }
        None => println!("{} No bootstrap nodes available", "!".bright_yellow()),
    }
}

fn print_bootstrap_settings(config: &config::Config) {
    println!("{}", "Bootstrap nodes:".bold());
    if config.bootstrap_nodes.is_empty() {
        println!("  {}", "(none configured)".dimmed());
    } else {
        for (i, node) in config.bootstrap_nodes.iter().enumerate() {
            println!("  {}. {:<20} {}", i + 1, node.alias, node.multiaddr);
        }
    }
}

fn print_relay(index: usize, relay: &RelayRecord) {
    let name = relay.alias.as_deref().unwrap_or(&relay.peer_id);
    println!(
        "  {}. {} (health {:.2}, seen {})",
        index,
        name.bright_cyan(),
        relay.health_score.value(),
        format_timestamp(relay.last_seen)
    );
    for addr in &relay.addrs {
        println!("       {}", addr.to_string().dimmed());
    }
}

fn format_timestamp(timestamp: u64) -> String {
    use chrono::{DateTime, Local, Utc};

    let dt = DateTime::from_timestamp(timestamp as i64, 0).unwrap_or_else(Utc::now);
    let local: DateTime<Local> = dt.into();

    local.format("%Y-%m-%d %H:%M:%S").to_string()
}
