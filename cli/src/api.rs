// Client for the relay read endpoint
//
// `relaymesh relays` asks a running node (ours or a public one) for its
// live relay list instead of joining the DHT itself.

use anyhow::{Context, Result};
use hyper::{Body, Method, Request};
use relaymesh_core::store::decode_records;
use relaymesh_core::RelayRecord;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn relays_endpoint(base_url: &str) -> String {
    format!("{}/api/relays", base_url.trim_end_matches('/'))
}

/// Fetch the live relay list from the node at `base_url`
pub async fn fetch_relays(base_url: &str) -> Result<Vec<RelayRecord>> {
    let client = hyper::Client::new();
    let req = Request::builder()
        .method(Method::GET)
        .uri(relays_endpoint(base_url))
        .header("accept", "application/json")
        .body(Body::empty())?;

    let resp = tokio::time::timeout(REQUEST_TIMEOUT, client.request(req))
        .await
        .with_context(|| format!("Timed out contacting {}", base_url))?
        .with_context(|| format!("Failed to contact {}", base_url))?;

    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("Relay endpoint returned {}", status);
    }

    let body_bytes = hyper::body::to_bytes(resp.into_body()).await?;
    let records = decode_records(&body_bytes).context("Invalid relay list")?;
    Ok(records)
}
