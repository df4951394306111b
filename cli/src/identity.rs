// Persistent network identity
//
// A relay's peer id is what other nodes find in the shared relay set, so it
// has to survive restarts.

use anyhow::{Context, Result};
use libp2p::identity::Keypair;
use std::path::Path;

pub const KEY_FILE: &str = "identity.key";

/// Load the keypair stored at `path`, generating and saving a new ed25519
/// keypair if the file does not exist.
pub fn load_or_create_keypair(path: &Path) -> Result<Keypair> {
    if path.exists() {
        let bytes = std::fs::read(path).context("Failed to read identity key")?;
        return Keypair::from_protobuf_encoding(&bytes).context("Corrupt identity key");
    }

    let keypair = Keypair::generate_ed25519();
    let bytes = keypair
        .to_protobuf_encoding()
        .context("Failed to encode identity key")?;
    std::fs::write(path, bytes).context("Failed to write identity key")?;
    tracing::info!("Generated new network identity at {}", path.display());
    Ok(keypair)
}
