//! Unix socket server for admin commands.
//!
//! The local event source for the engine: topic and category changes made
//! here are persisted, then announced as [`TopicEvent`]s so the matching
//! background job gets queued.

use crate::error::{Error, Result};
use crate::node::NodeState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tally_ledger::{
    Category, CategoryId, StatusFlag, Topic, TopicEvent, TopicId, TopicStatus, VoteStore, Voter,
    VoterId,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

fn default_true() -> bool {
    true
}

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Create or rename a category
    PutCategory {
        id: CategoryId,
        name: String,
        #[serde(default)]
        voting_enabled: bool,
        #[serde(default)]
        definition_topic: Option<TopicId>,
    },
    /// Switch voting on or off for a category
    SetCategoryVoting { id: CategoryId, enabled: bool },
    /// Create a topic or change its title
    PutTopic {
        id: TopicId,
        title: String,
        category_id: CategoryId,
    },
    /// Set or clear a status flag
    SetTopicStatus {
        id: TopicId,
        status: StatusFlag,
        enabled: bool,
    },
    /// Move a topic to another category
    MoveTopic { id: TopicId, category_id: CategoryId },
    /// Move `orig`'s posts into `dest`. A full move closes `orig`.
    MergeTopics {
        orig: TopicId,
        dest: TopicId,
        #[serde(default = "default_true")]
        full: bool,
    },
    /// Create a voter or update their profile; votes are kept
    PutVoter {
        id: VoterId,
        username: String,
        #[serde(default)]
        name: Option<String>,
        trust_level: u8,
    },
    /// Recompute every topic's cached count
    EnsureConsistency,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(state: Arc<NodeState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<NodeState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => {
                let state = Arc::clone(&state);
                // commands touch RocksDB and may sweep every topic
                tokio::task::spawn_blocking(move || execute_command(cmd, &state))
                    .await
                    .unwrap_or_else(|e| AdminResponse::Error {
                        error: e.to_string(),
                    })
            }
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

/// Execute one command against the node.
pub fn execute_command(cmd: AdminCommand, state: &NodeState) -> AdminResponse {
    if let AdminCommand::Ping = cmd {
        return AdminResponse::Pong;
    }
    match apply(cmd, state) {
        Ok(message) => {
            tracing::info!("{}", message);
            AdminResponse::Ok { message }
        }
        Err(e) => AdminResponse::Error {
            error: e.to_string(),
        },
    }
}

fn require_topic(state: &NodeState, id: TopicId) -> Result<Topic> {
    state
        .storage()
        .topic(id)?
        .ok_or_else(|| tally_ledger::Error::NotFound(format!("topic {}", id)).into())
}

/// Status a topic ends up in after a flag change.
fn status_after(current: TopicStatus, flag: StatusFlag, enabled: bool) -> TopicStatus {
    match (flag, enabled) {
        (StatusFlag::Closed | StatusFlag::Autoclosed, true) => TopicStatus::Closed,
        (StatusFlag::Archived, true) => TopicStatus::Archived,
        (StatusFlag::Closed | StatusFlag::Autoclosed, false) if current == TopicStatus::Closed => {
            TopicStatus::Open
        }
        (StatusFlag::Archived, false) if current == TopicStatus::Archived => TopicStatus::Open,
        _ => current,
    }
}

fn apply(cmd: AdminCommand, state: &NodeState) -> Result<String> {
    let storage = state.storage();
    match cmd {
        AdminCommand::PutCategory {
            id,
            name,
            voting_enabled,
            definition_topic,
        } => {
            let mut category = Category::new(id, name);
            category.voting_enabled = voting_enabled;
            category.definition_topic = definition_topic;
            storage.put_category(&category)?;
            state.dispatch(TopicEvent::CategoryConfigChanged)?;
            Ok(format!("Saved category {} ({})", id, category.name))
        }

        AdminCommand::SetCategoryVoting { id, enabled } => {
            let mut category = storage
                .category(id)?
                .ok_or_else(|| tally_ledger::Error::NotFound(format!("category {}", id)))?;
            category.voting_enabled = enabled;
            storage.put_category(&category)?;
            state.dispatch(TopicEvent::CategoryConfigChanged)?;
            Ok(format!(
                "Voting {} for category {}",
                if enabled { "enabled" } else { "disabled" },
                id
            ))
        }

        AdminCommand::PutTopic {
            id,
            title,
            category_id,
        } => {
            let topic = match storage.topic(id)? {
                Some(existing) if existing.category_id != category_id => {
                    return Err(Error::Ledger(tally_ledger::Error::InvalidInput(format!(
                        "topic {} is in category {}, use move_topic",
                        id, existing.category_id
                    ))));
                }
                Some(existing) => Topic { title, ..existing },
                None => Topic::new(id, title, category_id),
            };
            storage.put_topic(&topic)?;
            Ok(format!("Saved topic {}", id))
        }

        AdminCommand::SetTopicStatus {
            id,
            status,
            enabled,
        } => {
            let mut topic = require_topic(state, id)?;
            topic.status = status_after(topic.status, status, enabled);
            storage.put_topic(&topic)?;
            let job = state.dispatch(TopicEvent::StatusChanged {
                topic: id,
                status,
                enabled,
            })?;
            Ok(queued(format!("Topic {} is now {:?}", id, topic.status), job))
        }

        AdminCommand::MoveTopic { id, category_id } => {
            let mut topic = require_topic(state, id)?;
            if topic.category_id == category_id {
                return Ok(format!("Topic {} already in category {}", id, category_id));
            }
            topic.category_id = category_id;
            storage.put_topic(&topic)?;
            let job = state.dispatch(TopicEvent::Recategorized { topic: id })?;
            Ok(queued(format!("Moved topic {} to category {}", id, category_id), job))
        }

        AdminCommand::MergeTopics { orig, dest, full } => {
            let mut source = require_topic(state, orig)?;
            require_topic(state, dest)?;
            if full && !source.is_closed() {
                source.status = TopicStatus::Closed;
                storage.put_topic(&source)?;
                state.dispatch(TopicEvent::StatusChanged {
                    topic: orig,
                    status: StatusFlag::Closed,
                    enabled: true,
                })?;
            }
            let job = state.dispatch(TopicEvent::Merged { orig, dest })?;
            Ok(queued(format!("Moved topic {} into {}", orig, dest), job))
        }

        AdminCommand::PutVoter {
            id,
            username,
            name,
            trust_level,
        } => {
            let mut profile = Voter::new(id, username, trust_level);
            profile.name = name;
            state.engine.save_profile(profile)?;
            Ok(format!("Saved voter {}", id))
        }

        AdminCommand::EnsureConsistency => {
            let report = state.engine.ensure_consistency()?;
            Ok(format!(
                "Checked {} topics, corrected {}, failed {}",
                report.topics, report.corrected, report.failed
            ))
        }

        AdminCommand::Ping => Ok("pong".into()),
    }
}

fn queued(message: String, job: Option<tally_ledger::Job>) -> String {
    match job {
        Some(job) => format!("{}; queued {}", message, job),
        None => message,
    }
}
