// HTTP read endpoint served by `relaymesh start`
//
//   GET /api/relays     live relay records, best health first
//   GET /api/bootstrap  the resolved bootstrap nodes and their source
//   GET /health         liveness and a few node counters

use anyhow::{Context, Result};
use relaymesh_core::{
    BootstrapNode, BootstrapResolution, BootstrapSourceKind, Clock, RegistryView, RelayRecord,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use warp::Filter;

// ============================================================================
// API CONTEXT — shared state for HTTP endpoints
// ============================================================================

pub struct ApiContext {
    pub local_peer_id: String,
    pub view: RegistryView,
    pub bootstrap: BootstrapResolution,
    pub clock: Arc<dyn Clock>,
    pub start_time: Instant,
}

// ============================================================================
// API RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct BootstrapPayload {
    source: Option<BootstrapSourceKind>,
    nodes: Vec<BootstrapNode>,
}

#[derive(Debug, Serialize)]
struct HealthPayload {
    status: &'static str,
    peer_id: String,
    version: &'static str,
    uptime_seconds: u64,
    cached_relays: usize,
}

// ============================================================================
// SERVER START
// ============================================================================

/// Bind the API port and serve in the background. Fails if the port is taken.
pub async fn start(port: u16, ctx: Arc<ApiContext>) -> Result<JoinHandle<()>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind relay API on {}", addr))?;

    let ctx_filter = warp::any().map({
        let ctx = ctx.clone();
        move || ctx.clone()
    });

    let relays_route = warp::path!("api" / "relays")
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(handle_relays)
        .boxed();

    let bootstrap_route = warp::path!("api" / "bootstrap")
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(handle_bootstrap)
        .boxed();

    let health_route = warp::path!("health")
        .and(warp::get())
        .and(ctx_filter)
        .and_then(handle_health)
        .boxed();

    let cors = warp::cors().allow_any_origin().allow_method("GET");
    let routes = relays_route
        .or(bootstrap_route)
        .or(health_route)
        .with(cors)
        .boxed();

    tracing::info!("Serving relay API on {}", addr);

    Ok(tokio::spawn(async move {
        warp::serve(routes).incoming(listener).run().await;
    }))
}

// ============================================================================
// API HANDLERS
// ============================================================================

async fn handle_relays(ctx: Arc<ApiContext>) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&relays_payload(&ctx).await))
}

async fn handle_bootstrap(ctx: Arc<ApiContext>) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&bootstrap_payload(&ctx.bootstrap)))
}

async fn handle_health(ctx: Arc<ApiContext>) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&health_payload(&ctx)))
}

async fn relays_payload(ctx: &ApiContext) -> Vec<RelayRecord> {
    ctx.view.serve(ctx.clock.now_secs()).await
}

fn bootstrap_payload(resolution: &BootstrapResolution) -> BootstrapPayload {
    BootstrapPayload {
        source: resolution.source,
        nodes: resolution.nodes.clone(),
    }
}

fn health_payload(ctx: &ApiContext) -> HealthPayload {
    HealthPayload {
        status: "ok",
        peer_id: ctx.local_peer_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: ctx.start_time.elapsed().as_secs(),
        cached_relays: ctx.view.registry().len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_core::{BootstrapResolver, BootstrapSource, ManualClock, RelayRegistry};

    const NOW: u64 = 1_750_000_000;
    const PEER: &str = "12D3KooWFYTuQ2FY8tXRtFKfpXkTSipTF55mZkLntwtN1nHu83qE";

    fn context(registry: RelayRegistry) -> ApiContext {
        ApiContext {
            local_peer_id: PEER.to_string(),
            view: RegistryView::new(registry, None),
            bootstrap: BootstrapResolver::new()
                .with_provider(BootstrapSource::hardcoded())
                .resolve(),
            clock: Arc::new(ManualClock::new(NOW)),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_relays_payload_shape() {
        let registry = RelayRegistry::new();
        let addr = relaymesh_core::validate(&format!("/ip4/203.0.113.5/tcp/4001/p2p/{}", PEER))
            .unwrap();
        registry.upsert(RelayRecord::new(
            PEER.to_string(),
            vec![addr],
            Some("rooftop".to_string()),
            NOW - 10,
            0.5,
        ));
        registry.upsert(RelayRecord::new("stale".to_string(), vec![], None, NOW - 400, 1.0));

        let ctx = context(registry);
        let json = serde_json::to_value(relays_payload(&ctx).await).unwrap();

        assert_eq!(
            json,
            serde_json::json!([{
                "peerId": PEER,
                "addrs": [format!("/ip4/203.0.113.5/tcp/4001/p2p/{}", PEER)],
                "alias": "rooftop",
                "lastSeen": NOW - 10,
                "healthScore": 0.5
            }])
        );
    }

    #[test]
    fn test_bootstrap_payload_reports_source() {
        let ctx = context(RelayRegistry::new());
        let json = serde_json::to_value(bootstrap_payload(&ctx.bootstrap)).unwrap();

        assert_eq!(json["source"], "hardcoded");
        assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(json["nodes"][0]["alias"], "vincenzo-bootstrap");
    }

    #[tokio::test]
    async fn test_start_fails_when_port_taken() {
        let taken = TcpListener::bind(("0.0.0.0", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = start(port, Arc::new(context(RelayRegistry::new()))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_serves_on_free_port() {
        let port = {
            let free = TcpListener::bind(("0.0.0.0", 0)).await.unwrap();
            free.local_addr().unwrap().port()
        };

        let handle = start(port, Arc::new(context(RelayRegistry::new()))).await.unwrap();
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[test]
    fn test_health_payload() {
        let ctx = context(RelayRegistry::new());
        let health = health_payload(&ctx);

        assert_eq!(health.status, "ok");
        assert_eq!(health.peer_id, PEER);
        assert_eq!(health.cached_relays, 0);
    }
}
