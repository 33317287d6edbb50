//! HTTP API for voting clients.

use crate::error::Error;
use crate::node::NodeState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_ledger::{
    Topic, TopicId, TopicTally, UnvoteReceipt, VoteReceipt, VoteStore, VoterId, VoterStatus,
    VoterSummary,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Votes
        .route("/voting/up_vote", post(up_vote))
        .route("/voting/down_vote", post(down_vote))
        .route("/voting/unvote", post(unvote))
        .route("/voting/who", get(who))
        // Topic and voter views
        .route("/voting/topics", get(list_topics))
        .route("/voting/topics/:id", get(get_topic))
        .route("/voting/voters/:id", get(get_voter))
        .route("/voting/voted-by/:id", get(voted_by))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Node error rendered as an HTTP response.
struct ApiError(Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Ledger(tally_ledger::Error::InvalidAccess(_)) => StatusCode::FORBIDDEN,
            Error::Ledger(tally_ledger::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Ledger(tally_ledger::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn not_found(what: String) -> ApiError {
    ApiError(Error::Ledger(tally_ledger::Error::NotFound(what)))
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready(State(state): State<AppState>) -> StatusCode {
    match state.engine.eligibility().allowed(state.storage().as_ref()) {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// --- Vote endpoints ---

#[derive(Debug, Deserialize)]
struct VoteRequest {
    voter_id: VoterId,
    topic_id: TopicId,
}

/// A vote the limit turned away is still answered with its receipt.
fn vote_response(receipt: VoteReceipt) -> (StatusCode, Json<VoteReceipt>) {
    let status = if receipt.recorded {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    };
    (status, Json(receipt))
}

async fn up_vote(
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<(StatusCode, Json<VoteReceipt>)> {
    let receipt = state.engine.up_vote(req.voter_id, req.topic_id)?;
    Ok(vote_response(receipt))
}

async fn down_vote(
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<(StatusCode, Json<VoteReceipt>)> {
    let receipt = state.engine.down_vote(req.voter_id, req.topic_id)?;
    Ok(vote_response(receipt))
}

async fn unvote(
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<UnvoteReceipt>> {
    Ok(Json(state.engine.unvote(req.voter_id, req.topic_id)?))
}

#[derive(Debug, Deserialize)]
struct WhoQuery {
    topic_id: TopicId,
}

/// Up-voters of a topic; `null` when who-voted is hidden.
async fn who(
    State(state): State<AppState>,
    Query(query): Query<WhoQuery>,
) -> ApiResult<Json<Option<Vec<VoterSummary>>>> {
    if state.storage().topic(query.topic_id)?.is_none() {
        return Err(not_found(format!("topic {}", query.topic_id)));
    }
    Ok(Json(state.engine.who_voted(query.topic_id)?))
}

// --- Topic endpoints ---

#[derive(Debug, Serialize)]
struct RankedTopic {
    #[serde(flatten)]
    topic: Topic,
    vote_count: i64,
}

async fn list_topics(State(state): State<AppState>) -> ApiResult<Json<Vec<RankedTopic>>> {
    let ranked = state
        .engine
        .topics_by_votes()?
        .into_iter()
        .map(|(topic, vote_count)| RankedTopic { topic, vote_count })
        .collect();
    Ok(Json(ranked))
}

#[derive(Debug, Deserialize)]
struct TopicViewQuery {
    voter_id: Option<VoterId>,
}

/// How the viewing voter relates to the topic.
#[derive(Debug, Serialize)]
struct ViewerVotes {
    user_voted: bool,
    user_up_voted: bool,
    user_down_voted: bool,
}

#[derive(Debug, Serialize)]
struct TopicView {
    #[serde(flatten)]
    tally: TopicTally,
    who_voted: Option<Vec<VoterSummary>>,
    viewer: Option<ViewerVotes>,
}

async fn get_topic(
    State(state): State<AppState>,
    Path(id): Path<TopicId>,
    Query(query): Query<TopicViewQuery>,
) -> ApiResult<Json<TopicView>> {
    let tally = state.engine.topic_tally(id)?;
    let who_voted = if tally.can_vote {
        state.engine.who_voted(id)?
    } else {
        None
    };
    let viewer = match query.voter_id {
        Some(voter) => Some(ViewerVotes {
            user_voted: state.engine.user_voted(voter, id)?,
            user_up_voted: state.engine.user_up_voted(voter, id)?,
            user_down_voted: state.engine.user_down_voted(voter, id)?,
        }),
        None => None,
    };
    Ok(Json(TopicView {
        tally,
        who_voted,
        viewer,
    }))
}

// --- Voter endpoints ---

async fn get_voter(
    State(state): State<AppState>,
    Path(id): Path<VoterId>,
) -> ApiResult<Json<VoterStatus>> {
    Ok(Json(state.engine.voter_status(id)?))
}

async fn voted_by(
    State(state): State<AppState>,
    Path(id): Path<VoterId>,
) -> ApiResult<Json<Vec<Topic>>> {
    match state.engine.voted_by(id)? {
        Some(topics) => Ok(Json(topics)),
        None => Err(not_found(format!("votes of voter {}", id))),
    }
}
