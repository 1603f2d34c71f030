use crate::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::extract::{Path, Query, State};
use punchout_core::protocol::{NextSequence, START_SCRIPT, ScoredSubmission, SubmitAck};
use punchout_core::session_state::{DEFAULT_SESSION_ID, ScoredResult, SessionPhase, SessionState};
use serde::{Deserialize, Serialize};

const DEFAULT_SEQUENCE_LENGTH: i64 = 5;

#[derive(Debug, Default, Deserialize)]
pub struct SessionParams {
    pub session_id: Option<String>,
}

impl SessionParams {
    pub fn id(&self) -> &str {
        self.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SequenceParams {
    pub length: Option<i64>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreakSummary {
    pub current_streak: u32,
    pub best_streak: u32,
    pub best_score: f64,
}

impl From<&SessionState> for StreakSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            current_streak: state.current_streak,
            best_streak: state.best_streak,
            best_score: state.best_score,
        }
    }
}

/// Control message that ends a session start, on HTTP and on the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StartStatus {
    Ready {
        script: &'static str,
        state: StreakSummary,
    },
    Error {
        message: String,
        script: &'static str,
        state: StreakSummary,
    },
}

impl StartStatus {
    pub fn ready(state: &SessionState) -> Self {
        StartStatus::Ready {
            script: START_SCRIPT,
            state: state.into(),
        }
    }

    pub fn error(message: String, state: &SessionState) -> Self {
        StartStatus::Error {
            message,
            script: START_SCRIPT,
            state: state.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateView {
    pub phase: SessionPhase,
    #[serde(flatten)]
    pub state: SessionState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetAck {
    pub message: &'static str,
}

pub async fn generate_sequence(
    State(app): State<AppState>,
    Query(params): Query<SequenceParams>,
) -> Result<Json<NextSequence>, ApiError> {
    let session_id = params.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID);
    let length = params.length.unwrap_or(DEFAULT_SEQUENCE_LENGTH);
    let next = app.trainer.next_sequence(session_id, length).await?;
    tracing::info!(session_id, sequence = %next.sequence, "generated sequence");
    Ok(Json(next))
}

pub async fn submit_result(
    State(app): State<AppState>,
    Path(num_correct): Path<u32>,
    Query(params): Query<SessionParams>,
) -> Result<Json<SubmitAck>, ApiError> {
    let ack = app.trainer.submit_result(params.id(), num_correct).await?;
    Ok(Json(ack))
}

pub async fn submit_scored_result(
    State(app): State<AppState>,
    Query(params): Query<SessionParams>,
    Json(result): Json<ScoredResult>,
) -> Result<Json<ScoredSubmission>, ApiError> {
    let scored = app
        .trainer
        .submit_scored_result(params.id(), &result)
        .await?;
    Ok(Json(scored))
}

/// Starts a session without audio; the client speaks the script itself.
pub async fn start_script(
    State(app): State<AppState>,
    Query(params): Query<SessionParams>,
) -> Result<Json<StartStatus>, ApiError> {
    let state = app.trainer.start_session(params.id()).await?;
    tracing::info!(session_id = params.id(), "session started");
    Ok(Json(StartStatus::ready(&state)))
}

pub async fn get_state(
    State(app): State<AppState>,
    Query(params): Query<SessionParams>,
) -> Result<Json<StateView>, ApiError> {
    let state = app.trainer.get_state(params.id()).await?;
    Ok(Json(StateView {
        phase: state.phase(),
        state,
    }))
}

pub async fn reset_state(
    State(app): State<AppState>,
    Query(params): Query<SessionParams>,
) -> Result<Json<ResetAck>, ApiError> {
    app.trainer.reset_state(params.id()).await?;
    tracing::info!(session_id = params.id(), "session reset");
    Ok(Json(ResetAck {
        message: "Game state reset successfully",
    }))
}

pub async fn health() -> &'static str {
    "ok"
}
