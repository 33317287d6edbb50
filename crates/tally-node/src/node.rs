//! Tally Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - HTTP API for voting clients
//! - Unix admin socket for topic lifecycle events (tally-admin CLI)
//! - One background worker draining the durable job queue

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::worker::{self, JobQueue};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tally_ledger::{Job, TopicEvent, VoteEngine, VotingSettings};

/// Read and parse an environment variable, falling back to `default` when
/// it is unset.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {}={:?}: {}", name, raw, e))),
        Err(_) => Ok(default),
    }
}

/// Voting settings from `TALLY_*` environment variables.
pub fn settings_from_env() -> Result<VotingSettings> {
    let defaults = VotingSettings::default();
    let mut limits = defaults.trust_level_limits;
    for (level, limit) in limits.iter_mut().enumerate() {
        *limit = env_or(&format!("TALLY_TL{}_VOTE_LIMIT", level), *limit)?;
    }

    Ok(VotingSettings {
        enabled: env_or("TALLY_VOTING_ENABLED", defaults.enabled)?,
        allow_down_vote: env_or("TALLY_ALLOW_DOWN_VOTE", defaults.allow_down_vote)?,
        show_who_voted: env_or("TALLY_SHOW_WHO_VOTED", defaults.show_who_voted)?,
        show_votes_on_profile: env_or(
            "TALLY_SHOW_VOTES_ON_PROFILE",
            defaults.show_votes_on_profile,
        )?,
        alert_votes_left: env_or("TALLY_ALERT_VOTES_LEFT", defaults.alert_votes_left)?,
        trust_level_limits: limits,
    })
}

/// Configuration for a tally node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for tally-admin CLI)
    pub admin_socket: PathBuf,

    pub voting: VotingSettings,
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(
            std::env::var("TALLY_DATA_DIR").unwrap_or_else(|_| "./tally-data".to_string()),
        );

        let api_addr = env_or("TALLY_API_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let admin_socket = std::env::var("TALLY_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("admin.sock"));

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            voting: settings_from_env()?,
        })
    }
}

/// Shared state for the node - one engine over one storage instance.
pub struct NodeState {
    pub engine: Arc<VoteEngine<Storage>>,
    pub jobs: JobQueue,
}

impl NodeState {
    pub fn storage(&self) -> &Arc<Storage> {
        self.engine.store()
    }

    /// Turn an event into a job and queue it.
    pub fn dispatch(&self, event: TopicEvent) -> Result<Option<Job>> {
        let Some(job) = self.engine.plan(&event)? else {
            tracing::debug!(?event, "Event needs no job");
            return Ok(None);
        };
        let seq = self.jobs.submit(job)?;
        tracing::info!(%job, seq, "Queued job");
        Ok(Some(job))
    }
}

/// A tally node instance.
pub struct TallyNode {
    state: Arc<NodeState>,
    worker: worker::JobWorker,
    config: NodeConfig,
}

impl TallyNode {
    /// Open storage, bring cached counts up to date and prepare the worker.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(&config.data_dir)?);
        let engine = Arc::new(VoteEngine::new(storage, config.voting.clone()));

        let sweep = Arc::clone(&engine);
        let report = tokio::task::spawn_blocking(move || sweep.ensure_consistency())
            .await
            .map_err(|e| Error::Worker(e.to_string()))??;
        tracing::info!(
            topics = report.topics,
            corrected = report.corrected,
            failed = report.failed,
            "Startup consistency sweep finished"
        );

        let (jobs, worker) = worker::channel(Arc::clone(&engine));
        let state = Arc::new(NodeState { engine, jobs });

        Ok(Self {
            state,
            worker,
            config,
        })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts job worker, admin socket and HTTP server).
    pub async fn run(self) -> Result<()> {
        let TallyNode {
            state,
            worker,
            config,
        } = self;

        tracing::info!("Tally node starting");
        tracing::info!("  API: http://{}", config.api_addr);
        tracing::info!("  Admin: {:?}", config.admin_socket);
        tracing::info!("  Data: {:?}", config.data_dir);

        tokio::spawn(worker.run());

        let admin_socket = AdminSocket::new(Arc::clone(&state), config.admin_socket.clone());
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        // Build HTTP API
        let app = api::build_router(state);

        // Start HTTP server
        let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", config.api_addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_parses_and_defaults() {
        std::env::set_var("TALLY_TEST_LIMIT", " 7 ");
        assert_eq!(env_or("TALLY_TEST_LIMIT", 1u32).unwrap(), 7);
        assert_eq!(env_or("TALLY_TEST_UNSET", 3u32).unwrap(), 3);

        std::env::set_var("TALLY_TEST_FLAG", "maybe");
        let err = env_or("TALLY_TEST_FLAG", false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
