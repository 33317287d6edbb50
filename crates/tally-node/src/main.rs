//! Tally Node binary
//!
//! Hosts the vote ledger behind an HTTP API and an admin socket.

use tally_node::{NodeConfig, TallyNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_node=info,tally_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tally Node");

    let config = NodeConfig::from_env()?;
    tracing::info!(settings = ?config.voting, "Voting settings loaded");

    // Create and run node
    let node = TallyNode::new(config).await?;
    node.run().await?;

    Ok(())
}
