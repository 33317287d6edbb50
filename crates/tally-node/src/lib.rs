//! Tally Node - daemon hosting the vote ledger
//!
//! Serves the [`tally_ledger`] engine over HTTP, persists it in RocksDB and
//! runs lifecycle and merge jobs in the background.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB-backed [`VoteStore`](tally_ledger::VoteStore)
//!   plus the durable job queue
//! - **Worker**: single sequential consumer of queued jobs
//! - **API**: HTTP endpoints for voting clients
//! - **Admin Socket**: Unix socket for topic lifecycle events (tally-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use tally_node::{NodeConfig, TallyNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = TallyNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod node;
pub mod storage;
pub mod worker;

pub use error::{Error, Result};
pub use node::{NodeConfig, NodeState, TallyNode};
pub use storage::Storage;
pub use worker::{JobQueue, JobWorker};
