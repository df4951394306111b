use relaymesh_core::bootstrap::{EmbeddedConfigProvider, EnvProvider};
use relaymesh_core::{
    resolve, BootstrapCandidate, BootstrapResolver, BootstrapSource, BootstrapSourceKind,
};

const PEER_A: &str = "12D3KooWFYTuQ2FY8tXRtFKfpXkTSipTF55mZkLntwtN1nHu83qE";
const PEER_B: &str = "12D3KooWETLNJUVLbkAbenbSPPdwN9ZLkBU3TLfyAeEUW2dsVptr";

fn addr(ip: &str, peer: &str) -> String {
    format!("/ip4/{}/tcp/4001/p2p/{}", ip, peer)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_user_settings_override_everything() {
    init_tracing();
    let user = vec![BootstrapCandidate::new("home", addr("203.0.113.7", PEER_A))];
    let cli = vec![addr("198.51.100.1", PEER_B)];

    let resolution = BootstrapResolver::new()
        .with_provider(BootstrapSource::hardcoded())
        .with_provider(BootstrapSource::cli_flags(&cli))
        .with_provider(BootstrapSource::user_settings(user))
        .resolve();

    assert_eq!(resolution.source, Some(BootstrapSourceKind::UserSettings));
    assert_eq!(resolution.nodes.len(), 1);
    assert_eq!(resolution.nodes[0].alias, "home");
    assert_eq!(resolution.nodes[0].address.to_string(), addr("203.0.113.7", PEER_A));
}

#[test]
fn test_cli_flags_used_when_user_settings_empty() {
    init_tracing();
    let cli = vec![addr("198.51.100.1", PEER_B), addr("198.51.100.2", PEER_A)];

    let resolution = BootstrapResolver::new()
        .with_provider(BootstrapSource::user_settings(Vec::new()))
        .with_provider(BootstrapSource::cli_flags(&cli))
        .with_provider(BootstrapSource::hardcoded())
        .resolve();

    assert_eq!(resolution.source, Some(BootstrapSourceKind::CliFlag));
    let aliases: Vec<&str> = resolution.nodes.iter().map(|n| n.alias.as_str()).collect();
    assert_eq!(aliases, vec!["cli-1", "cli-2"]);
}

#[test]
fn test_invalid_user_settings_fall_through() {
    init_tracing();
    let user = vec![
        BootstrapCandidate::new("typo", "/ip4/999.1.1.1/tcp/4001"),
        BootstrapCandidate::new("no-peer", "/ip4/203.0.113.7/tcp/4001"),
    ];
    let cli = vec![addr("198.51.100.1", PEER_B)];

    let resolution = BootstrapResolver::new()
        .with_provider(BootstrapSource::user_settings(user))
        .with_provider(BootstrapSource::cli_flags(&cli))
        .resolve();

    assert_eq!(resolution.source, Some(BootstrapSourceKind::CliFlag));
    assert_eq!(resolution.addresses().len(), 1);
}

#[test]
fn test_env_provider_reads_variable_lazily() {
    init_tracing();
    let var = "RELAYMESH_TEST_BOOTSTRAP_LAZY";
    let resolver = BootstrapResolver::new()
        .with_provider(BootstrapSource::cli_flags(&[]))
        .with_provider(EnvProvider::new(var))
        .with_provider(BootstrapSource::hardcoded());

    std::env::set_var(
        var,
        format!("{}, ,{}", addr("198.51.100.9", PEER_A), addr("198.51.100.10", PEER_B)),
    );
    let resolution = resolver.resolve();
    std::env::remove_var(var);

    assert_eq!(resolution.source, Some(BootstrapSourceKind::EnvVar));
    let aliases: Vec<&str> = resolution.nodes.iter().map(|n| n.alias.as_str()).collect();
    assert_eq!(aliases, vec!["bootstrap-1", "bootstrap-2"]);
}

#[test]
fn test_unset_env_falls_back_to_embedded_config() {
    init_tracing();
    let resolution = BootstrapResolver::new()
        .with_provider(EnvProvider::new("RELAYMESH_TEST_BOOTSTRAP_UNSET"))
        .with_provider(EmbeddedConfigProvider::default())
        .with_provider(BootstrapSource::hardcoded())
        .resolve();

    assert_eq!(resolution.source, Some(BootstrapSourceKind::ConfigFile));
    assert_eq!(resolution.nodes.len(), 3);
    assert_eq!(resolution.nodes[0].alias, "vincenzo-bootstrap");
}

#[test]
fn test_broken_config_payload_falls_back_to_hardcoded() {
    init_tracing();
    let resolution = BootstrapResolver::new()
        .with_provider(EmbeddedConfigProvider::new("{ \"nodes\": [ oops"))
        .with_provider(BootstrapSource::hardcoded())
        .resolve();

    assert_eq!(resolution.source, Some(BootstrapSourceKind::Hardcoded));
    let hardcoded: Vec<String> = resolution
        .addresses()
        .iter()
        .map(|a| a.to_string())
        .collect();
    assert!(hardcoded.contains(&addr("134.199.240.145", PEER_A)));
}

#[test]
fn test_resolve_returns_first_valid_source() {
    init_tracing();
    let sources = vec![
        BootstrapSource::hardcoded(),
        BootstrapSource::env_value("garbage,/dns4/example.com/tcp/4001"),
        BootstrapSource::config_payload(&format!(
            r#"{{ "nodes": [ {{ "alias": "lab", "multiaddr": "{}" }} ] }}"#,
            addr("192.0.2.44", PEER_B)
        ))
        .unwrap(),
    ];

    let resolved = resolve(sources);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].to_string(), addr("192.0.2.44", PEER_B));
}

#[test]
fn test_nothing_valid_anywhere() {
    init_tracing();
    let resolution = BootstrapResolver::new()
        .with_provider(BootstrapSource::user_settings(Vec::new()))
        .with_provider(BootstrapSource::env_value(""))
        .resolve();

    assert_eq!(resolution.source, None);
    assert!(resolution.is_empty());
}
